//! ID generation utilities for submitr
//!
//! Provides functions for generating unique identifiers for jobs and workers.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique job ID
///
/// Format: `job-{timestamp_ms}-{random_hex}`
/// Example: `job-1738300800123-a1b2c3d4`
pub fn generate_job_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("job-{}-{:08x}", timestamp, random)
}

/// Generate a worker ID for an in-process worker
///
/// Format: `worker-{index:02}-{random_hex}`
pub fn generate_worker_id(index: usize) -> String {
    let random: u16 = rand::rng().random();
    format!("worker-{:02}-{:04x}", index, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_job_id_format() {
        let id = generate_job_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "job");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_job_id_uniqueness() {
        let ids: std::collections::HashSet<String> = (0..100).map(|_| generate_job_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_generate_worker_id_format() {
        let id = generate_worker_id(3);
        assert!(id.starts_with("worker-03-"));
        assert_eq!(id.len(), "worker-03-".len() + 4);
    }
}
