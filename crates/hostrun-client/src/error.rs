#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server url {url} cannot carry a path")]
    NotABaseUrl { url: String },
    #[error("no bearer token available in environment variable {env}")]
    MissingToken { env: String },
    #[error("http request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::ClientError;
    use std::error::Error;

    #[test]
    fn status_error_renders_code_and_body() {
        let err = ClientError::Status {
            status: 401,
            body: "{\"error\":\"unauthorized\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server answered 401: {\"error\":\"unauthorized\"}"
        );
    }

    #[test]
    fn invalid_url_keeps_parse_source() {
        let source = url::Url::parse("::nope").expect_err("must not parse");
        let err = ClientError::InvalidUrl {
            url: "::nope".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid server url ::nope"));
        assert!(err.source().is_some());
    }
}
