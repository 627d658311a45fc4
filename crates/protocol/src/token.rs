//! Hardware auth token
//!
//! The token is an opaque, HMAC-signed blob minted by the platform's
//! authenticator. This layer never verifies it; it only checks the length and
//! hands the bytes to the device, which is the source of truth for validity.
//!
//! Layout (69 bytes, packed):
//!
//! | offset | field              | encoding      |
//! |--------|--------------------|---------------|
//! | 0      | version            | u8            |
//! | 1      | challenge          | host order    |
//! | 9      | user_id            | host order    |
//! | 17     | authenticator_id   | host order    |
//! | 25     | authenticator_type | network order |
//! | 29     | timestamp          | network order |
//! | 37     | hmac               | 32 bytes      |

use crate::error::{ProtocolError, Result};
use byteorder::{BigEndian, ByteOrder, NativeEndian};

/// Size of a serialized hardware auth token
pub const AUTH_TOKEN_SIZE: usize = 69;

const CHALLENGE: usize = 1;
const USER_ID: usize = 9;
const AUTHENTICATOR_ID: usize = 17;
const AUTHENTICATOR_TYPE: usize = 25;
const TIMESTAMP: usize = 29;
const HMAC: usize = 37;

/// Fixed-size hardware auth token, copied verbatim from the client
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HardwareAuthToken([u8; AUTH_TOKEN_SIZE]);

impl HardwareAuthToken {
    /// Copy a token out of a client buffer
    ///
    /// Only the length is validated.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; AUTH_TOKEN_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidTokenSize {
                    expected: AUTH_TOKEN_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// All-zero token
    pub fn zeroed() -> Self {
        Self([0; AUTH_TOKEN_SIZE])
    }

    /// Build an unsigned token from its fields (hmac left zeroed)
    pub fn from_fields(
        challenge: u64,
        user_id: u64,
        authenticator_id: u64,
        authenticator_type: u32,
        timestamp: u64,
    ) -> Self {
        let mut raw = [0u8; AUTH_TOKEN_SIZE];
        NativeEndian::write_u64(&mut raw[CHALLENGE..USER_ID], challenge);
        NativeEndian::write_u64(&mut raw[USER_ID..AUTHENTICATOR_ID], user_id);
        NativeEndian::write_u64(
            &mut raw[AUTHENTICATOR_ID..AUTHENTICATOR_TYPE],
            authenticator_id,
        );
        BigEndian::write_u32(&mut raw[AUTHENTICATOR_TYPE..TIMESTAMP], authenticator_type);
        BigEndian::write_u64(&mut raw[TIMESTAMP..HMAC], timestamp);
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn version(&self) -> u8 {
        self.0[0]
    }

    pub fn challenge(&self) -> u64 {
        NativeEndian::read_u64(&self.0[CHALLENGE..USER_ID])
    }

    pub fn user_id(&self) -> u64 {
        NativeEndian::read_u64(&self.0[USER_ID..AUTHENTICATOR_ID])
    }

    pub fn authenticator_id(&self) -> u64 {
        NativeEndian::read_u64(&self.0[AUTHENTICATOR_ID..AUTHENTICATOR_TYPE])
    }

    pub fn authenticator_type(&self) -> u32 {
        BigEndian::read_u32(&self.0[AUTHENTICATOR_TYPE..TIMESTAMP])
    }

    pub fn timestamp(&self) -> u64 {
        BigEndian::read_u64(&self.0[TIMESTAMP..HMAC])
    }

    pub fn hmac(&self) -> &[u8] {
        &self.0[HMAC..]
    }
}

impl Default for HardwareAuthToken {
    fn default() -> Self {
        Self::zeroed()
    }
}

// The hmac stays out of logs.
impl std::fmt::Debug for HardwareAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareAuthToken")
            .field("version", &self.version())
            .field("challenge", &self.challenge())
            .field("user_id", &self.user_id())
            .field("authenticator_id", &self.authenticator_id())
            .field("authenticator_type", &self.authenticator_type())
            .field("timestamp", &self.timestamp())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_size_check() {
        assert!(HardwareAuthToken::from_slice(&[0u8; AUTH_TOKEN_SIZE]).is_ok());
        assert_eq!(
            HardwareAuthToken::from_slice(&[]),
            Err(ProtocolError::InvalidTokenSize {
                expected: AUTH_TOKEN_SIZE,
                actual: 0
            })
        );
        assert!(HardwareAuthToken::from_slice(&[0u8; AUTH_TOKEN_SIZE + 1]).is_err());
    }

    #[test]
    fn test_token_fields() {
        let token = HardwareAuthToken::from_fields(0xdead_beef, 99, 7, 2, 123_456);
        assert_eq!(token.version(), 0);
        assert_eq!(token.challenge(), 0xdead_beef);
        assert_eq!(token.user_id(), 99);
        assert_eq!(token.authenticator_id(), 7);
        assert_eq!(token.authenticator_type(), 2);
        assert_eq!(token.timestamp(), 123_456);
        assert!(token.hmac().iter().all(|b| *b == 0));

        // authenticator_type and timestamp are big-endian on the wire
        assert_eq!(&token.as_bytes()[25..29], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_token_verbatim_copy() {
        let bytes: Vec<u8> = (0..AUTH_TOKEN_SIZE as u8).collect();
        let token = HardwareAuthToken::from_slice(&bytes).unwrap();
        assert_eq!(token.as_bytes(), bytes.as_slice());
        assert_eq!(token.hmac().len(), 32);
    }

    #[test]
    fn test_debug_hides_hmac() {
        let mut bytes = [0u8; AUTH_TOKEN_SIZE];
        bytes[HMAC..].fill(0xab);
        let token = HardwareAuthToken::from_slice(&bytes).unwrap();
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("171"));
        assert!(rendered.contains("challenge"));
    }
}
