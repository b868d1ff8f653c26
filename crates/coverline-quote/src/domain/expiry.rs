//! Quote expiry settings.

use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, de};

/// Whether quotes expire, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirySettings {
    /// Whether new quotes get an expiry at all.
    pub enabled: bool,
    /// Days after creation that a quote expires.
    pub expiry_days: u32,
    /// Local hour of day (0-23) the expiry instant is normalised to.
    #[serde(deserialize_with = "deserialize_hour_of_day")]
    pub hour_of_day: u32,
    /// Time zone the hour of day is interpreted in.
    pub time_zone: Tz,
}

fn deserialize_hour_of_day<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let hour = u32::deserialize(deserializer)?;
    if hour > 23 {
        return Err(de::Error::custom(format!(
            "hour_of_day must be between 0 and 23, got {hour}"
        )));
    }
    Ok(hour)
}

impl Default for ExpirySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            expiry_days: 30,
            hour_of_day: 0,
            time_zone: chrono_tz::Australia::Melbourne,
        }
    }
}

impl ExpirySettings {
    /// Enabled settings with the given number of days and default normalisation.
    #[must_use]
    pub fn enabled_for_days(expiry_days: u32) -> Self {
        Self {
            enabled: true,
            expiry_days,
            ..Self::default()
        }
    }

    /// Computes the expiry instant for a quote created at `created_at`.
    ///
    /// The creation instant is moved into the configured time zone,
    /// `expiry_days` calendar days are added, and the time of day is set to
    /// `hour_of_day:00`. Returns `None` when expiry is disabled or the hour
    /// is out of range.
    #[must_use]
    pub fn expiry_for(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        let local_date = created_at
            .with_timezone(&self.time_zone)
            .date_naive()
            .checked_add_days(Days::new(u64::from(self.expiry_days)))?;
        let time = NaiveTime::from_hms_opt(self.hour_of_day, 0, 0)?;
        let local = local_date.and_time(time);
        let resolved = match self.time_zone.from_local_datetime(&local) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            // The hour falls in a daylight-saving gap; the next hour exists.
            LocalResult::None => self
                .time_zone
                .from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest()?,
        };
        Some(resolved.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_settings_produce_no_expiry() {
        let settings = ExpirySettings::default();

        assert_eq!(settings.expiry_for(Utc::now()), None);
    }

    #[test]
    fn test_expiry_is_normalised_to_local_hour() {
        // 2026-01-15T10:00Z is 21:00 on the 15th in Melbourne (UTC+11).
        let created = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let settings = ExpirySettings::enabled_for_days(30);

        let expiry = settings.expiry_for(created).unwrap();

        // Midnight on 2026-02-14 in Melbourne is 13:00Z on the 13th.
        assert_eq!(expiry, Utc.with_ymd_and_hms(2026, 2, 13, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_local_date_decides_the_day_not_utc_date() {
        // 14:00Z on the 15th is already 01:00 on the 16th in Melbourne.
        let created = Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap();
        let settings = ExpirySettings {
            hour_of_day: 9,
            ..ExpirySettings::enabled_for_days(1)
        };

        let expiry = settings.expiry_for(created).unwrap();

        // 09:00 on the 17th in Melbourne is 22:00Z on the 16th.
        assert_eq!(expiry, Utc.with_ymd_and_hms(2026, 1, 16, 22, 0, 0).unwrap());
    }
}
