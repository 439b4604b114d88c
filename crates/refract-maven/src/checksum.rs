//! Artifact checksum verification against repository sidecar files.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use refract_util::errors::RefractError;

use crate::download::MavenTransport;

/// Verify downloaded bytes against the repository's checksum sidecars.
///
/// Tries SHA-256 first, then SHA-1, then MD5. A repository without any
/// sidecar gets a warning, not an error.
pub fn verify(
    transport: &dyn MavenTransport,
    file_url: &str,
    data: &[u8],
) -> miette::Result<()> {
    for (extension, algo) in [("sha256", Algo::Sha256), ("sha1", Algo::Sha1), ("md5", Algo::Md5)] {
        let sidecar_url = format!("{file_url}.{extension}");
        if let Some(sidecar) = transport.get(&sidecar_url)? {
            let expected = extract_hash(&String::from_utf8_lossy(&sidecar));
            let actual = algo.hex(data);
            return check(&actual, &expected, algo.name(), file_url);
        }
    }
    tracing::warn!("no checksum sidecar found for {file_url}");
    Ok(())
}

#[derive(Clone, Copy)]
enum Algo {
    Sha256,
    Sha1,
    Md5,
}

impl Algo {
    fn name(self) -> &'static str {
        match self {
            Algo::Sha256 => "SHA-256",
            Algo::Sha1 => "SHA-1",
            Algo::Md5 => "MD5",
        }
    }

    fn hex(self, data: &[u8]) -> String {
        match self {
            Algo::Sha256 => hex(&Sha256::digest(data)),
            Algo::Sha1 => hex(&Sha1::digest(data)),
            Algo::Md5 => hex(&Md5::digest(data)),
        }
    }
}

fn check(actual: &str, expected: &str, algo: &str, url: &str) -> miette::Result<()> {
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("{algo} ok for {url}");
        Ok(())
    } else {
        Err(RefractError::Transport {
            message: format!("{algo} mismatch for {url}: expected {expected}, got {actual}"),
        }
        .into())
    }
}

/// Sidecar files sometimes carry `<hash>  <filename>`; keep the hash only.
fn extract_hash(content: &str) -> String {
    content
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticTransport(HashMap<String, Vec<u8>>);

    impl MavenTransport for StaticTransport {
        fn get(&self, url: &str) -> miette::Result<Option<Vec<u8>>> {
            Ok(self.0.get(url).cloned())
        }
    }

    #[test]
    fn matching_sha1_passes() {
        // sha1("data") = a17c9aaa61e80a1bf71d0d850af4e5baa9800bbd
        let mut responses = HashMap::new();
        responses.insert(
            "https://repo/file.jar.sha1".to_string(),
            b"a17c9aaa61e80a1bf71d0d850af4e5baa9800bbd".to_vec(),
        );
        let transport = StaticTransport(responses);
        assert!(verify(&transport, "https://repo/file.jar", b"data").is_ok());
    }

    #[test]
    fn sidecar_with_filename_suffix_passes() {
        let mut responses = HashMap::new();
        responses.insert(
            "https://repo/file.jar.sha1".to_string(),
            b"a17c9aaa61e80a1bf71d0d850af4e5baa9800bbd  file.jar".to_vec(),
        );
        let transport = StaticTransport(responses);
        assert!(verify(&transport, "https://repo/file.jar", b"data").is_ok());
    }

    #[test]
    fn mismatch_fails() {
        let mut responses = HashMap::new();
        responses.insert(
            "https://repo/file.jar.sha1".to_string(),
            b"deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_vec(),
        );
        let transport = StaticTransport(responses);
        assert!(verify(&transport, "https://repo/file.jar", b"data").is_err());
    }

    #[test]
    fn missing_sidecars_are_tolerated() {
        let transport = StaticTransport(HashMap::new());
        assert!(verify(&transport, "https://repo/file.jar", b"data").is_ok());
    }
}
