use subtle::ConstantTimeEq;

/// The single credential pair the honeypot pretends to accept.
///
/// The decision is pure; recording the attempt is the caller's concern so
/// the policy can be tested without a telemetry pipeline behind it.
#[derive(Debug, Clone)]
pub struct CredentialPolicy {
    username: String,
    password: String,
}

impl CredentialPolicy {
    pub fn new(username: String, password: String) -> Self {
        CredentialPolicy { username, password }
    }

    /// Constant-time comparison of both fields. Both comparisons always run;
    /// the results are combined with a bitwise and so neither the username
    /// nor the password check can leak through timing.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}
