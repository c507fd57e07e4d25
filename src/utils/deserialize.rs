use serde::de::Deserializer;
use serde::Deserialize;
use std::time::Duration;

/// Durations are configured as milliseconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms: u64 = Deserialize::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "deserialize_duration")]
        timeout: Duration,
    }

    #[test]
    fn should_deserialize_milliseconds() {
        let wrapper: Wrapper = serde_json::from_str(r#"{"timeout": 1500}"#).unwrap();
        assert_eq!(wrapper.timeout, Duration::from_millis(1500));
    }
}
