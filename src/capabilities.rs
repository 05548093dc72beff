//! CA capability advertisement (`GetCACaps`).
//!
//! A CA advertises its optional features as newline-separated tokens.
//! Unknown tokens are ignored so that future protocol revisions do not
//! break older clients.

use std::collections::HashSet;
use std::fmt;

/// A single capability token from the closed SCEP vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// AES-128-CBC content encryption.
    Aes,
    /// Triple-DES-CBC content encryption.
    TripleDes,
    /// SHA-1 message digest.
    Sha1,
    /// SHA-256 message digest.
    Sha256,
    /// SHA-512 message digest.
    Sha512,
    /// PKIOperation may be sent via HTTP POST.
    PostPkiOperation,
    /// The CA supports the GetNextCACert rollover query.
    GetNextCaCert,
    /// Renewal of an existing certificate is permitted.
    Renewal,
    /// The CA implements the full mandatory-to-implement baseline.
    ScepStandard,
}

impl Capability {
    /// Parse a capability token as it appears on the wire.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "AES" => Some(Self::Aes),
            "DES3" => Some(Self::TripleDes),
            "SHA-1" => Some(Self::Sha1),
            "SHA-256" => Some(Self::Sha256),
            "SHA-512" => Some(Self::Sha512),
            "POSTPKIOperation" => Some(Self::PostPkiOperation),
            "GetNextCACert" => Some(Self::GetNextCaCert),
            "Renewal" => Some(Self::Renewal),
            "SCEPStandard" => Some(Self::ScepStandard),
            _ => None,
        }
    }

    /// The wire token for this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes => "AES",
            Self::TripleDes => "DES3",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::PostPkiOperation => "POSTPKIOperation",
            Self::GetNextCaCert => "GetNextCACert",
            Self::Renewal => "Renewal",
            Self::ScepStandard => "SCEPStandard",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of capabilities a CA advertised for one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    set: HashSet<Capability>,
}

impl Capabilities {
    /// Parse a `GetCACaps` response body.
    ///
    /// One token per line; surrounding whitespace is stripped and unknown
    /// tokens are skipped.
    pub fn parse(body: &str) -> Self {
        let mut set = HashSet::new();
        for line in body.lines() {
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            match Capability::parse(token) {
                Some(cap) => {
                    set.insert(cap);
                }
                None => {
                    tracing::debug!("ignoring unknown CA capability token {:?}", token);
                }
            }
        }
        Self { set }
    }

    /// Build a capability set from explicit members.
    pub fn from_iter(caps: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            set: caps.into_iter().collect(),
        }
    }

    /// Whether the given capability was advertised.
    pub fn contains(&self, cap: Capability) -> bool {
        self.set.contains(&cap)
    }

    /// Whether PKIOperation may be POSTed.
    pub fn post_supported(&self) -> bool {
        self.contains(Capability::PostPkiOperation)
    }

    /// Whether the CA answers GetNextCACert.
    pub fn rollover_supported(&self) -> bool {
        self.contains(Capability::GetNextCaCert)
    }

    /// Whether certificate renewal is advertised.
    pub fn renewal_supported(&self) -> bool {
        self.contains(Capability::Renewal)
    }

    /// The strongest content cipher both sides support.
    ///
    /// AES if advertised, Triple-DES otherwise (the universal floor).
    pub fn strongest_cipher(&self) -> Capability {
        if self.contains(Capability::Aes) {
            Capability::Aes
        } else {
            Capability::TripleDes
        }
    }

    /// The strongest message digest both sides support.
    ///
    /// SHA-512 over SHA-256 over SHA-1; SHA-1 is the universal floor.
    pub fn strongest_digest(&self) -> Capability {
        if self.contains(Capability::Sha512) {
            Capability::Sha512
        } else if self.contains(Capability::Sha256) {
            Capability::Sha256
        } else {
            Capability::Sha1
        }
    }

    /// Number of advertised capabilities.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// True if the CA advertised nothing we understand.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
