//! Shared outbound HTTP client construction.

use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Install the rustls crypto provider. Safe to call more than once.
pub fn install_crypto_provider() {
    // Err means a provider is already installed, which is all we need
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build the client used for every remote call. The timeout bounds each request end to end.
pub fn build_client(request_timeout: Duration) -> anyhow::Result<Client> {
    install_crypto_provider();
    let client = Client::builder()
        .timeout(request_timeout)
        .user_agent(concat!("imgctl/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Append path segments to a base URL, percent-encoding each one.
///
/// Segments may contain `/`; it is encoded rather than treated as a separator.
pub fn with_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("URL {base} cannot be a base"))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}
