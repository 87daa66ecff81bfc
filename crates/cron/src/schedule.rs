//! Next-run computation for all schedule kinds.

use {
    anyhow::{Result, bail},
    chrono::{DateTime, TimeZone, Utc},
    cron::Schedule,
};

use crate::types::CronSchedule;

/// Compute the next run time (epoch millis) for a given schedule.
///
/// Returns `None` if the schedule has no future runs (e.g. a past one-shot).
pub fn compute_next_run(schedule: &CronSchedule, now_ms: u64) -> Result<Option<u64>> {
    match schedule {
        CronSchedule::At { at_ms } => {
            if *at_ms > now_ms {
                Ok(Some(*at_ms))
            } else {
                Ok(None) // already past
            }
        },
        CronSchedule::Every {
            every_ms,
            anchor_ms,
        } => {
            if *every_ms == 0 {
                bail!("every_ms must be > 0");
            }
            let anchor = anchor_ms.unwrap_or(now_ms);
            if anchor > now_ms {
                // Anchor is in the future — next run is at the anchor.
                Ok(Some(anchor))
            } else {
                // How many intervals have elapsed since anchor?
                let elapsed = now_ms - anchor;
                let intervals = elapsed / every_ms;
                let next = anchor + (intervals + 1) * every_ms;
                Ok(Some(next))
            }
        },
        CronSchedule::Cron { expr, tz } => {
            let schedule: Schedule = expr
                .parse()
                .or_else(|_| {
                    // The `cron` crate requires 7 fields (sec min hour dom month dow year).
                    // Users typically provide 5 fields (min hour dom month dow).
                    // Prepend "0" for seconds and append "*" for year.
                    let padded = format!("0 {expr} *");
                    padded.parse::<Schedule>()
                })
                .map_err(|e| anyhow::anyhow!("invalid cron expression '{expr}': {e}"))?;

            let now_dt = DateTime::from_timestamp_millis(now_ms as i64)
                .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());

            let next = if let Some(tz_name) = tz {
                let tz: chrono_tz::Tz = tz_name
                    .parse()
                    .map_err(|_| anyhow::anyhow!("unknown timezone: {tz_name}"))?;
                let now_local = now_dt.with_timezone(&tz);
                schedule
                    .after(&now_local)
                    .next()
                    .map(|dt| dt.timestamp_millis() as u64)
            } else {
                schedule
                    .after(&now_dt)
                    .next()
                    .map(|dt| dt.timestamp_millis() as u64)
            };

            Ok(next)
        },
    }
}
