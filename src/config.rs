use std::time::Duration;

use crate::model::{Audience, Ms};

pub const HOUR_MS: Ms = 3_600_000;
pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// One configured reminder: which audience gets pinged how long before the
/// lesson's effective start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderOffset {
    pub audience: Audience,
    pub lead_ms: Ms,
}

/// Everything the engine needs that is deployment-specific. Threaded
/// explicitly into the components that use it — there is no ambient global
/// admin list or timezone.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recipients of Teacher-audience reminders and admin notices.
    pub admin_ids: Vec<i64>,
    /// Display timezone for collaborators that render text. The engine
    /// itself works in UTC ms only.
    pub timezone: String,
    pub offsets: Vec<ReminderOffset>,
    /// Slots carry no end time; a lesson is considered over this long after
    /// its effective start.
    pub lesson_duration_ms: Ms,
    pub tick_interval: Duration,
    /// Terminal bookings older than this are dropped at compaction.
    pub retention_ms: Ms,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            timezone: "Asia/Tashkent".into(),
            offsets: vec![
                ReminderOffset { audience: Audience::Student, lead_ms: 4 * HOUR_MS },
                ReminderOffset { audience: Audience::Student, lead_ms: 30 * MINUTE_MS },
                ReminderOffset { audience: Audience::Teacher, lead_ms: 10 * MINUTE_MS },
            ],
            lesson_duration_ms: HOUR_MS,
            tick_interval: Duration::from_secs(30),
            retention_ms: 30 * DAY_MS,
        }
    }
}

impl EngineConfig {
    /// Build from `CHIME_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(ids) = std::env::var("CHIME_ADMIN_IDS") {
            config.admin_ids = ids
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
        }
        if let Ok(tz) = std::env::var("CHIME_TIMEZONE") {
            config.timezone = tz;
        }
        if let Some(secs) = env_num("CHIME_TICK_SECS") {
            config.tick_interval = Duration::from_secs(secs);
        }
        if let Some(minutes) = env_num("CHIME_LESSON_MINUTES") {
            config.lesson_duration_ms = minutes as Ms * MINUTE_MS;
        }
        if let Some(days) = env_num("CHIME_RETENTION_DAYS") {
            config.retention_ms = days as Ms * DAY_MS;
        }
        config
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn env_num(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_offsets_match_lesson_schedule() {
        let config = EngineConfig::default();
        assert_eq!(config.offsets.len(), 3);
        let student: Vec<Ms> = config
            .offsets
            .iter()
            .filter(|o| o.audience == Audience::Student)
            .map(|o| o.lead_ms)
            .collect();
        assert_eq!(student, vec![4 * HOUR_MS, 30 * MINUTE_MS]);
        let teacher: Vec<Ms> = config
            .offsets
            .iter()
            .filter(|o| o.audience == Audience::Teacher)
            .map(|o| o.lead_ms)
            .collect();
        assert_eq!(teacher, vec![10 * MINUTE_MS]);
    }

    #[test]
    fn admin_check() {
        let config = EngineConfig {
            admin_ids: vec![7, 11],
            ..EngineConfig::default()
        };
        assert!(config.is_admin(7));
        assert!(!config.is_admin(8));
    }
}
