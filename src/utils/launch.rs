use std::future::Future;

/// Run the given future to completion on a current-thread runtime.
///
/// Every operation against the store is a sequential, blocking
/// request/response step; there is no parallelism to schedule, so one
/// thread of control is all the runtime carries.
pub fn launch_with_runtime<F>(future: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = Result<(), Box<dyn std::error::Error>>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_run_a_future_to_completion() {
        let mut ran = false;
        launch_with_runtime(async {
            ran = true;
            Ok(())
        })
        .unwrap();
        assert!(ran);
    }

    #[test]
    fn should_forward_errors_out_of_the_runtime() {
        let result = launch_with_runtime(async {
            Err(Box::<dyn std::error::Error>::from("broken"))
        });
        assert_eq!(result.unwrap_err().to_string(), "broken");
    }
}
