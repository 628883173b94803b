//! Byte sources for image URLs.

use super::EngineError;

const FILE_SCHEME: &str = "file://";

/// Where the bytes behind a URL live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source<'a> {
    Http(&'a str),
    File(&'a str),
}

pub fn classify(url: &str) -> Source<'_> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Source::Http(url)
    } else {
        Source::File(url.strip_prefix(FILE_SCHEME).unwrap_or(url))
    }
}

/// Download or read the bytes behind `url`.
pub async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, EngineError> {
    match classify(url) {
        Source::Http(url) => {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|err| EngineError::Fetch(format!("request failed: {err}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(EngineError::Fetch(format!("server answered {status}")));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|err| EngineError::Fetch(format!("body read failed: {err}")))?;
            Ok(bytes.to_vec())
        }
        Source::File(path) => tokio::fs::read(path)
            .await
            .map_err(|err| EngineError::Fetch(format!("{path}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_schemes() {
        assert_eq!(classify("https://x/y.dcm"), Source::Http("https://x/y.dcm"));
        assert_eq!(classify("http://x/y.dcm"), Source::Http("http://x/y.dcm"));
        assert_eq!(classify("file:///tmp/a.dcm"), Source::File("/tmp/a.dcm"));
        assert_eq!(classify("/tmp/a.dcm"), Source::File("/tmp/a.dcm"));
    }

    #[tokio::test]
    async fn test_missing_file_is_a_fetch_error() {
        let client = reqwest::Client::new();
        let err = fetch_bytes(&client, "/definitely/not/here.dcm")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fetch(_)));
    }
}
