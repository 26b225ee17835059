use std::fmt;
use std::str::FromStr;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use thiserror::Error;
use tracing::{instrument, trace};

/// Block size of the reference cipher configuration.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

const AES_BLOCK_SIZE: usize = 16;
const AES_KEY_LEN: usize = 16;

/// Errors raised by a block cipher.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CipherError {
    /// Input was not a whole number of blocks.
    #[error("cipher input of {len} bytes is not a multiple of the {block_size}-byte block")]
    Misaligned { len: usize, block_size: usize },
}

/// Errors returned while padding and encrypting frames.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameCipherError {
    /// The padded frame did not line up with the cipher block size.
    #[error("padded frame of {len} bytes is not a multiple of the {block_size}-byte cipher block")]
    Misaligned { len: usize, block_size: usize },
    /// The alignment is not a whole number of cipher blocks.
    #[error("{alignment}-byte alignment does not fit the {cipher_block_size}-byte cipher block")]
    BlockSizeMismatch {
        alignment: usize,
        cipher_block_size: usize,
    },
    /// The cipher rejected the frame.
    #[error(transparent)]
    Cipher(#[from] CipherError),
    /// A key string could not be parsed.
    #[error("cipher key must be {expected} hex-encoded bytes")]
    InvalidKey { expected: usize },
}

/// Sequential block cipher used to protect frames on the wire.
///
/// Implementations may carry state between calls; the frame cipher feeds
/// every frame of a session through one instance, in send order.
pub trait BlockCipher: Send {
    /// Block size in bytes.
    fn block_size(&self) -> usize;

    /// Encrypts `buffer` in place.
    ///
    /// # Errors
    ///
    /// Returns an error when `buffer` is not block aligned.
    fn encrypt(&mut self, buffer: &mut [u8]) -> Result<(), CipherError>;
}

/// 128-bit AES key.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct AesKey([u8; AES_KEY_LEN]);

impl AesKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn new(bytes: [u8; AES_KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

impl FromStr for AesKey {
    type Err = FrameCipherError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameCipherError::InvalidKey {
            expected: AES_KEY_LEN,
        };
        let bytes = hex::decode(value.trim()).map_err(|_| invalid())?;
        let key: [u8; AES_KEY_LEN] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Self(key))
    }
}

/// AES-128 applied block by block (ECB).
pub struct Aes128Ecb {
    cipher: Aes128,
}

impl Aes128Ecb {
    /// Creates the cipher from a key.
    #[must_use]
    pub fn new(key: AesKey) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&key.0)),
        }
    }
}

impl fmt::Debug for Aes128Ecb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes128Ecb").finish_non_exhaustive()
    }
}

impl BlockCipher for Aes128Ecb {
    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn encrypt(&mut self, buffer: &mut [u8]) -> Result<(), CipherError> {
        if !buffer.len().is_multiple_of(AES_BLOCK_SIZE) {
            return Err(CipherError::Misaligned {
                len: buffer.len(),
                block_size: AES_BLOCK_SIZE,
            });
        }

        for block in buffer.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
}

/// Right-pads `bytes` with zeroes to a whole number of `block_size` blocks.
///
/// An empty input grows to one block. A zero `block_size` disables padding.
///
/// ```
/// use shining_glasses::align;
///
/// assert_eq!(16, align(b"\x06LIGHT\x64", 16).len());
/// assert_eq!(32, align(&[0u8; 17], 16).len());
/// assert_eq!(3, align(&[1, 2, 3], 0).len());
/// ```
#[must_use]
pub fn align(bytes: &[u8], block_size: usize) -> Vec<u8> {
    let mut aligned = bytes.to_vec();
    if block_size == 0 {
        return aligned;
    }

    let blocks = bytes.len().div_ceil(block_size).max(1);
    aligned.resize(blocks * block_size, 0x00);
    aligned
}

/// Pads frames to the configured alignment and encrypts them in send order.
pub struct FrameCipher {
    cipher: Option<Box<dyn BlockCipher>>,
    block_size: usize,
}

impl FrameCipher {
    /// Creates a frame cipher that only pads.
    #[must_use]
    pub fn plaintext(block_size: usize) -> Self {
        Self {
            cipher: None,
            block_size,
        }
    }

    /// Creates a frame cipher that pads to `block_size` and then encrypts.
    ///
    /// # Errors
    ///
    /// Returns an error when `block_size` is not a non-zero multiple of the
    /// cipher's block size.
    pub fn new(cipher: Box<dyn BlockCipher>, block_size: usize) -> Result<Self, FrameCipherError> {
        let cipher_block_size = cipher.block_size();
        if block_size == 0
            || cipher_block_size == 0
            || !block_size.is_multiple_of(cipher_block_size)
        {
            return Err(FrameCipherError::BlockSizeMismatch {
                alignment: block_size,
                cipher_block_size,
            });
        }

        Ok(Self {
            cipher: Some(cipher),
            block_size,
        })
    }

    /// Creates the reference AES-128 frame cipher with 16-byte alignment.
    #[must_use]
    pub fn aes128(key: AesKey) -> Self {
        Self {
            cipher: Some(Box::new(Aes128Ecb::new(key))),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Configured alignment in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns `true` when frames are encrypted.
    #[must_use]
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    /// Pads `frame` and, when a cipher is configured, encrypts it.
    ///
    /// # Errors
    ///
    /// Returns an error when the padded frame is not block aligned or the
    /// cipher rejects it.
    #[instrument(skip(self, frame), level = "trace", fields(frame_len = frame.len()))]
    pub fn encrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, FrameCipherError> {
        let Some(cipher) = self.cipher.as_mut() else {
            return Ok(frame.to_vec());
        };

        let mut buffer = align(frame, self.block_size);
        let cipher_block_size = cipher.block_size();
        if cipher_block_size == 0 || !buffer.len().is_multiple_of(cipher_block_size) {
            return Err(FrameCipherError::Misaligned {
                len: buffer.len(),
                block_size: cipher_block_size,
            });
        }

        cipher.encrypt(&mut buffer)?;
        trace!(padded_len = buffer.len(), "encrypted frame");
        Ok(buffer)
    }
}

impl fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCipher")
            .field("block_size", &self.block_size)
            .field("encrypting", &self.is_encrypting())
            .finish()
    }
}
