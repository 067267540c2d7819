//! Channel naming shared by publishers and relays.

use crate::types::JobId;

/// Prefix of every per-job channel.
pub const JOB_CHANNEL_PREFIX: &str = "job:";

/// Name of the pub/sub channel carrying progress events for `job_id`.
pub fn job_channel(job_id: JobId) -> String {
    format!("{JOB_CHANNEL_PREFIX}{job_id}")
}
