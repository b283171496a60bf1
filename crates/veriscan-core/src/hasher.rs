use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(HashAlgorithm::Md5),
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One incremental digest state per configured algorithm, fed chunk by chunk
/// so a single pass over the file serves every algorithm.
enum DigestState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => DigestState::Md5(Md5::new()),
            HashAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => DigestState::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Md5(h) => h.update(data),
            DigestState::Sha1(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
            DigestState::Sha512(h) => h.update(data),
            DigestState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> String {
        match self {
            DigestState::Md5(h) => to_hex(&h.finalize()),
            DigestState::Sha1(h) => to_hex(&h.finalize()),
            DigestState::Sha256(h) => to_hex(&h.finalize()),
            DigestState::Sha512(h) => to_hex(&h.finalize()),
            DigestState::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Compute every configured digest over the file in one bounded-memory pass.
///
/// The file is read sequentially in `chunk_size` blocks; each block feeds all
/// algorithm states, so memory use is one chunk regardless of file size.
/// Returns algorithm name → lowercase hex digest. A file that becomes
/// unreadable mid-read surfaces as an `io::Error` for the caller to record;
/// there are no retries here.
pub fn compute_digests(
    path: &Path,
    algorithms: &[HashAlgorithm],
    chunk_size: usize,
) -> io::Result<BTreeMap<String, String>> {
    let mut file = File::open(path)?;
    let mut states: Vec<(HashAlgorithm, DigestState)> = algorithms
        .iter()
        .map(|&a| (a, DigestState::new(a)))
        .collect();

    let mut buffer = vec![0u8; chunk_size.max(512)];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        for (_, state) in states.iter_mut() {
            state.update(&buffer[..read]);
        }
    }

    Ok(states
        .into_iter()
        .map(|(algorithm, state)| (algorithm.as_str().to_string(), state.finalize()))
        .collect())
}
