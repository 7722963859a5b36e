use std::time::{Duration, SystemTime};

/// Converts a `SystemTime` into milliseconds since the Unix epoch.
///
/// Times before the epoch are clamped to `0`.
pub fn datetime_to_millis(st: &SystemTime) -> u64 {
    match st.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(_) => 0,
    }
}

/// Converts milliseconds since the Unix epoch back into a `SystemTime`.
pub fn millis_to_datetime(ms: u64) -> Option<SystemTime> {
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_millis(ms))
}

pub mod ts_millis {
    use std::fmt;

    use serde::{de, ser};

    use super::*;

    pub fn deserialize<'de, D>(d: D) -> Result<SystemTime, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        d.deserialize_any(MillisTimestampVisitor)
    }

    pub fn serialize<S>(st: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match st.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            Err(_) => Err(ser::Error::custom(format!(
                "invalid `SystemTime` instance: {:?}",
                st
            ))),
        }
    }

    struct MillisTimestampVisitor;

    impl<'de> de::Visitor<'de> for MillisTimestampVisitor {
        type Value = SystemTime;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a unix timestamp in milliseconds")
        }

        fn visit_u64<E>(self, value: u64) -> Result<SystemTime, E>
        where
            E: de::Error,
        {
            millis_to_datetime(value)
                .ok_or_else(|| E::custom(format!("invalid timestamp: {}", value)))
        }

        fn visit_i64<E>(self, value: i64) -> Result<SystemTime, E>
        where
            E: de::Error,
        {
            if value < 0 {
                return Err(E::custom(format!("invalid timestamp: {}", value)));
            }
            self.visit_u64(value as u64)
        }

        fn visit_f64<E>(self, value: f64) -> Result<SystemTime, E>
        where
            E: de::Error,
        {
            if !value.is_finite() || value < 0.0 {
                return Err(E::custom(format!("invalid timestamp: {}", value)));
            }
            self.visit_u64(value as u64)
        }
    }
}

pub mod duration_millis {
    use std::time::Duration;

    use serde::{de, ser, Deserialize};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let ms = f64::deserialize(d)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(de::Error::custom(format!("invalid duration: {}", ms)));
        }
        Ok(Duration::from_secs_f64(ms / 1000.0))
    }
}
