//! Pull request addressing: parsing web URLs and rendering them back.

use linkpull_state::PullRef;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PullUrlError {
    #[error("not a pull request URL: {0}")]
    Malformed(String),

    #[error("invalid pull request number in {0}")]
    BadNumber(String),
}

/// Parse `https://gitee.com/<owner>/<repo>/pulls/<n>` into a [`PullRef`].
///
/// The repository is the third segment from the end and the number the last
/// one. The short form `<repo>#<n>` is accepted too.
pub fn parse_pull_url(input: &str) -> Result<PullRef, PullUrlError> {
    let trimmed = input.trim().trim_end_matches('/');

    if !trimmed.contains('/') {
        let (repo, number) = trimmed
            .split_once('#')
            .ok_or_else(|| PullUrlError::Malformed(input.to_string()))?;
        return build(repo, number, input);
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() < 3 {
        return Err(PullUrlError::Malformed(input.to_string()));
    }
    let number = segments[segments.len() - 1];
    let repo = segments[segments.len() - 3];
    build(repo, number, input)
}

fn build(repo: &str, number: &str, input: &str) -> Result<PullRef, PullUrlError> {
    if repo.is_empty() {
        return Err(PullUrlError::Malformed(input.to_string()));
    }
    let number: u64 = number
        .parse()
        .map_err(|_| PullUrlError::BadNumber(input.to_string()))?;
    if number == 0 {
        return Err(PullUrlError::BadNumber(input.to_string()));
    }
    Ok(PullRef::new(repo, number))
}

/// Web URL of a pull request, as shown in comments and reports.
pub fn pull_url(web_base: &str, owner: &str, pull: &PullRef) -> String {
    format!(
        "{}/{}/{}/pulls/{}",
        web_base.trim_end_matches('/'),
        owner,
        pull.repo,
        pull.number
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_web_url() {
        let pull = parse_pull_url("https://gitee.com/src-openeuler/python-requests/pulls/42").unwrap();
        assert_eq!(pull, PullRef::new("python-requests", 42));
    }

    #[test]
    fn test_parse_tolerates_trailing_slash() {
        let pull = parse_pull_url("https://gitee.com/src-openeuler/zlib/pulls/7/").unwrap();
        assert_eq!(pull, PullRef::new("zlib", 7));
    }

    #[test]
    fn test_parse_short_form() {
        assert_eq!(parse_pull_url("kernel#1024").unwrap(), PullRef::new("kernel", 1024));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            parse_pull_url("https://gitee.com/src-openeuler/zlib/pulls/abc"),
            Err(PullUrlError::BadNumber(_))
        ));
        assert!(matches!(parse_pull_url("zlib"), Err(PullUrlError::Malformed(_))));
        assert!(matches!(parse_pull_url("zlib#0"), Err(PullUrlError::BadNumber(_))));
    }

    #[test]
    fn test_pull_url_roundtrips_through_parse() {
        let pull = PullRef::new("openssl", 311);
        let url = pull_url("https://gitee.com/", "src-openeuler", &pull);
        assert_eq!(url, "https://gitee.com/src-openeuler/openssl/pulls/311");
        assert_eq!(parse_pull_url(&url).unwrap(), pull);
    }
}
