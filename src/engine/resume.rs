//! Resume controller (§4.5): pause snapshotting, resume validation, and the
//! `canResume` advisory.
//!
//! Grounded on the `other_examples` reference
//! `talaria-sequoia/resumable_downloader.rs` pattern (ETag capture, `Range`
//! injection on restart, temp-file validation before trusting a partial
//! file), re-expressed through this crate's `TaskException`/`Result` idiom
//! rather than that reference's own error type.

use crate::types::{ResumeData, TaskException, TaskId};

/// Build the [`ResumeData`] snapshot written when a download is paused.
pub fn snapshot_for_pause(
    task_id: &TaskId,
    temp_file_path: &str,
    bytes_written: u64,
    e_tag: Option<String>,
) -> ResumeData {
    ResumeData {
        task_id: task_id.clone(),
        data: temp_file_path.to_string(),
        required_start_byte: bytes_written,
        e_tag,
    }
}

/// Whether the server has advertised range support, checked between request
/// start and the first body byte. Purely advisory: a `false` result does not
/// block a pause, it only tells the caller a resume is unlikely to succeed.
pub fn can_resume(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false)
}

/// Outcome of validating a resume attempt's response against the temp file
/// on disk and the previously stored resume data.
pub struct ResumeOutcome {
    /// Byte offset the executor should truncate the temp file to and
    /// continue appending from.
    pub start_byte: u64,
}

/// Decide whether a stored [`ResumeData`] is usable given the temp file's
/// actual length. Per §4.5: if the file is missing or its length does not
/// match `requiredStartByte`, resume is not feasible and the caller should
/// fall through to a fresh start instead of treating this as fatal.
pub fn is_resume_feasible(resume: &ResumeData, temp_file_len: Option<u64>) -> bool {
    temp_file_len == Some(resume.required_start_byte)
}

/// Validate a resume response: must be 206, `Content-Range: bytes A-B/T`
/// with `T == B+1` and `A <= temp_file_len`, and (if present) a matching
/// strong ETag.
pub fn validate_resume_response(
    resume: &ResumeData,
    temp_file_len: u64,
    status: reqwest::StatusCode,
    content_range: Option<&str>,
    e_tag: Option<&str>,
) -> Result<ResumeOutcome, TaskException> {
    if status != reqwest::StatusCode::PARTIAL_CONTENT {
        return Err(TaskException::Resume {
            description: format!("expected 206 Partial Content, got {status}"),
        });
    }

    let content_range = content_range.ok_or_else(|| TaskException::Resume {
        description: "206 response missing Content-Range".to_string(),
    })?;

    let (start, end, total) = parse_content_range(content_range).ok_or_else(|| TaskException::Resume {
        description: format!("unparseable Content-Range: {content_range}"),
    })?;

    if total != end + 1 {
        return Err(TaskException::Resume {
            description: format!("Content-Range total {total} does not match end+1 {}", end + 1),
        });
    }

    if start > temp_file_len {
        return Err(TaskException::Resume {
            description: format!(
                "Content-Range start {start} exceeds temp file length {temp_file_len}"
            ),
        });
    }

    if let (Some(expected), Some(actual)) = (&resume.e_tag, e_tag)
        && (actual.starts_with("W/") || actual != expected)
    {
        return Err(TaskException::Resume {
            description: "ETag changed since pause, resume is stale".to_string(),
        });
    }

    Ok(ResumeOutcome { start_byte: start })
}

/// Parse `bytes A-B/T` into `(A, B, T)`.
fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?, total.trim().parse().ok()?))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_resume() -> ResumeData {
        ResumeData {
            task_id: TaskId("t1".to_string()),
            data: "/tmp/partial".to_string(),
            required_start_byte: 4096,
            e_tag: Some("\"abc\"".to_string()),
        }
    }

    #[test]
    fn feasible_only_when_temp_file_len_matches() {
        let resume = sample_resume();
        assert!(is_resume_feasible(&resume, Some(4096)));
        assert!(!is_resume_feasible(&resume, Some(4000)));
        assert!(!is_resume_feasible(&resume, None));
    }

    #[test]
    fn validates_well_formed_resume_response() {
        let resume = sample_resume();
        let outcome = validate_resume_response(
            &resume,
            4096,
            reqwest::StatusCode::PARTIAL_CONTENT,
            Some("bytes 4096-8191/8192"),
            Some("\"abc\""),
        )
        .expect("valid");
        assert_eq!(outcome.start_byte, 4096);
    }

    #[test]
    fn rejects_non_206_status() {
        let resume = sample_resume();
        let err = validate_resume_response(
            &resume,
            4096,
            reqwest::StatusCode::OK,
            Some("bytes 4096-8191/8192"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TaskException::Resume { .. }));
    }

    #[test]
    fn rejects_mismatched_etag() {
        let resume = sample_resume();
        let err = validate_resume_response(
            &resume,
            4096,
            reqwest::StatusCode::PARTIAL_CONTENT,
            Some("bytes 4096-8191/8192"),
            Some("\"different\""),
        )
        .unwrap_err();
        assert!(matches!(err, TaskException::Resume { .. }));
    }

    #[test]
    fn rejects_weak_etag() {
        let resume = sample_resume();
        let err = validate_resume_response(
            &resume,
            4096,
            reqwest::StatusCode::PARTIAL_CONTENT,
            Some("bytes 4096-8191/8192"),
            Some("W/\"abc\""),
        )
        .unwrap_err();
        assert!(matches!(err, TaskException::Resume { .. }));
    }

    #[test]
    fn rejects_inconsistent_total() {
        let resume = sample_resume();
        let err = validate_resume_response(
            &resume,
            4096,
            reqwest::StatusCode::PARTIAL_CONTENT,
            Some("bytes 4096-8191/9000"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TaskException::Resume { .. }));
    }

    #[test]
    fn can_resume_detects_accept_ranges_bytes() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT_RANGES, "bytes".parse().unwrap());
        assert!(can_resume(&headers));

        let empty = reqwest::header::HeaderMap::new();
        assert!(!can_resume(&empty));
    }
}
