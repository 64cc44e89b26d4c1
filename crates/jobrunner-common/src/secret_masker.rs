// SecretMasker: replaces registered secret values in log output with `***`.

use parking_lot::RwLock;
use std::sync::Arc;

const MASK: &str = "***";

/// Thread-safe store of secret values.
///
/// Secrets are kept longest-first so a secret that contains another one is
/// masked whole rather than leaving a partial value behind.
///
/// A [`scoped`](Self::scoped) masker also applies its parent's secrets; values
/// added to it stay out of the parent and go away with it.
#[derive(Debug, Default)]
pub struct SecretMasker {
    secrets: RwLock<Vec<String>>,
    parent: Option<Arc<SecretMasker>>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scoped(parent: Arc<SecretMasker>) -> Self {
        Self {
            secrets: RwLock::new(Vec::new()),
            parent: Some(parent),
        }
    }

    /// Register a secret. Blank values are ignored.
    pub fn add_value(&self, secret: &str) {
        let secret = secret.trim();
        if secret.is_empty() {
            return;
        }

        let mut secrets = self.secrets.write();
        if secrets.iter().any(|s| s == secret) {
            return;
        }
        secrets.push(secret.to_string());
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    pub fn add_values<'a, I>(&self, secrets: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for secret in secrets {
            self.add_value(secret);
        }
    }

    pub fn mask_secrets(&self, input: &str) -> String {
        let masked = self.mask_own(input);
        match self.parent {
            Some(ref parent) => parent.mask_secrets(&masked),
            None => masked,
        }
    }

    fn mask_own(&self, input: &str) -> String {
        let secrets = self.secrets.read();
        let shortest = secrets.last().map(|s| s.len()).unwrap_or(0);
        if secrets.is_empty() || input.len() < shortest {
            return input.to_string();
        }

        let mut out = input.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }

    /// Secrets registered on this masker, not counting its parent's.
    pub fn secret_count(&self) -> usize {
        self.secrets.read().len()
    }
}
