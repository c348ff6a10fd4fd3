//! CashTokens output data and the token prefix codec.
//!
//! Token data is carried inside an output's locking bytecode field, ahead of
//! the locking bytecode itself:
//!
//! | Field              | Size                                   |
//! |--------------------|----------------------------------------|
//! | `PREFIX_TOKEN`     | 1 byte (`0xef`)                        |
//! | category           | 32 bytes (wire order)                  |
//! | bitfield           | 1 byte                                 |
//! | commitment         | CompactUint-prefixed, if flagged       |
//! | fungible amount    | CompactUint, if flagged                |

use serde::{Deserialize, Serialize};

use bch_primitives::util::{BchReader, BchWriter, CompactUint};

/// The byte which marks the start of a token prefix.
pub const PREFIX_TOKEN: u8 = 0xef;

/// The largest fungible token amount an output may carry.
pub const MAXIMUM_TOKEN_AMOUNT: u64 = i64::MAX as u64;

const HAS_AMOUNT: u8 = 0b0001_0000;
const HAS_NFT: u8 = 0b0010_0000;
const HAS_COMMITMENT_LENGTH: u8 = 0b0100_0000;
const RESERVED_BIT: u8 = 0b1000_0000;
const TOKEN_FORMAT_MASK: u8 = 0xf0;
const NFT_CAPABILITY_MASK: u8 = 0x0f;
const CATEGORY_LENGTH: usize = 32;
const MINIMUM_PREFIX_LENGTH: usize = 34;

/// Errors produced while decoding a token prefix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenPrefixError {
    #[error("Invalid token prefix: insufficient length. The minimum possible length is 34. Missing bytes: {missing}")]
    InsufficientLength { missing: usize },

    #[error("Invalid token prefix: reserved bit is set. Bitfield: 0b{bitfield:b}")]
    ReservedBit { bitfield: u8 },

    #[error("Invalid token prefix: capability must be none (0), mutable (1), or minting (2). Capability value: {capability}")]
    InvalidCapability { capability: u8 },

    #[error("Invalid token prefix: commitment requires an NFT. Bitfield: 0b{bitfield:b}")]
    CommitmentWithoutNft { bitfield: u8 },

    #[error("Invalid token prefix: capability requires an NFT. Bitfield: 0b{bitfield:b}")]
    CapabilityWithoutNft { bitfield: u8 },

    #[error("Invalid token prefix: if encoded, commitment length must be greater than 0.")]
    CommitmentLengthZero,

    #[error("Invalid token prefix: invalid non-fungible token commitment. {0}")]
    InvalidCommitment(String),

    #[error("Invalid token prefix: invalid fungible token amount encoding. {0}")]
    InvalidAmountEncoding(String),

    #[error("Invalid token prefix: if encoded, fungible token amount must be greater than 0.")]
    ZeroAmount,

    #[error("Invalid token prefix: exceeds maximum fungible token amount of 9223372036854775807. Encoded amount: {0}")]
    ExcessiveAmount(u64),

    #[error("Invalid token prefix: must encode at least one token. Bitfield: 0b{bitfield:b}")]
    NoTokens { bitfield: u8 },
}

/// The capability of a non-fungible token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NftCapability {
    /// An immutable NFT.
    None,
    /// An NFT whose commitment may be modified by the spending transaction.
    Mutable,
    /// An NFT which may create new NFTs of the same category.
    Minting,
}

impl NftCapability {
    /// The capability number encoded in the low nibble of the bitfield.
    pub fn to_u8(self) -> u8 {
        match self {
            NftCapability::None => 0,
            NftCapability::Mutable => 1,
            NftCapability::Minting => 2,
        }
    }

    /// Parse a capability number, returning `None` for undefined values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NftCapability::None),
            1 => Some(NftCapability::Mutable),
            2 => Some(NftCapability::Minting),
            _ => None,
        }
    }
}

/// A non-fungible token held by an output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nft {
    pub capability: NftCapability,
    #[serde(with = "crate::serde_hex::bytes")]
    pub commitment: Vec<u8>,
}

/// The tokens held by an output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// The fungible token amount, `0` if the output holds only an NFT.
    pub amount: u64,
    /// The 32-byte token category in user interface byte order.
    #[serde(with = "crate::serde_hex::hash")]
    pub category: [u8; 32],
    /// The non-fungible token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft: Option<Nft>,
}

impl Token {
    /// Create a fungible-only token.
    pub fn fungible(category: [u8; 32], amount: u64) -> Self {
        Token { amount, category, nft: None }
    }

    /// Create an NFT-only token.
    pub fn non_fungible(category: [u8; 32], capability: NftCapability, commitment: Vec<u8>) -> Self {
        Token {
            amount: 0,
            category,
            nft: Some(Nft { capability, commitment }),
        }
    }

    /// The category in wire (reversed) byte order.
    pub fn category_wire_order(&self) -> [u8; 32] {
        let mut category = self.category;
        category.reverse();
        category
    }
}

/// Encode a token prefix.
///
/// Returns an empty vector when `token` is `None`, or when it encodes no
/// tokens at all (no NFT and a zero amount).
pub fn encode_token_prefix(token: Option<&Token>) -> Vec<u8> {
    let Some(token) = token else {
        return Vec::new();
    };
    if token.nft.is_none() && token.amount < 1 {
        return Vec::new();
    }
    let has_nft = if token.nft.is_some() { HAS_NFT } else { 0 };
    let capability = token.nft.as_ref().map(|nft| nft.capability.to_u8()).unwrap_or(0);
    let commitment = token
        .nft
        .as_ref()
        .map(|nft| nft.commitment.as_slice())
        .filter(|commitment| !commitment.is_empty());
    let has_commitment_length = if commitment.is_some() { HAS_COMMITMENT_LENGTH } else { 0 };
    let has_amount = if token.amount > 0 { HAS_AMOUNT } else { 0 };

    let mut writer = BchWriter::with_capacity(MINIMUM_PREFIX_LENGTH + 50);
    writer.write_u8(PREFIX_TOKEN);
    writer.write_bytes(&token.category_wire_order());
    writer.write_u8(has_nft | has_commitment_length | has_amount | capability);
    if let Some(commitment) = commitment {
        writer.write_length_prefixed(commitment);
    }
    if has_amount != 0 {
        writer.write_compact_uint(CompactUint(token.amount));
    }
    writer.into_bytes()
}

/// Read an optional token prefix from the start of a locking bytecode field.
///
/// # Arguments
/// * `field` - The full contents of an output's locking bytecode field.
///
/// # Returns
/// The decoded token (if the field begins with `PREFIX_TOKEN`) and the number
/// of bytes consumed by the prefix.
pub fn read_token_prefix(field: &[u8]) -> Result<(Option<Token>, usize), TokenPrefixError> {
    if field.first() != Some(&PREFIX_TOKEN) {
        return Ok((None, 0));
    }
    if field.len() < MINIMUM_PREFIX_LENGTH {
        return Err(TokenPrefixError::InsufficientLength {
            missing: MINIMUM_PREFIX_LENGTH - field.len(),
        });
    }
    let mut category = [0u8; CATEGORY_LENGTH];
    category.copy_from_slice(&field[1..1 + CATEGORY_LENGTH]);
    category.reverse();

    let bitfield = field[1 + CATEGORY_LENGTH];
    let structure = bitfield & TOKEN_FORMAT_MASK;
    if structure & RESERVED_BIT != 0 {
        return Err(TokenPrefixError::ReservedBit { bitfield });
    }
    let capability_value = bitfield & NFT_CAPABILITY_MASK;
    let capability = NftCapability::from_u8(capability_value).ok_or(
        TokenPrefixError::InvalidCapability {
            capability: capability_value,
        },
    )?;
    let has_nft = structure & HAS_NFT != 0;
    let has_commitment_length = structure & HAS_COMMITMENT_LENGTH != 0;
    if has_commitment_length && !has_nft {
        return Err(TokenPrefixError::CommitmentWithoutNft { bitfield });
    }
    let has_amount = structure & HAS_AMOUNT != 0;

    let mut reader = BchReader::new(&field[MINIMUM_PREFIX_LENGTH..]);
    if has_nft {
        let commitment = if has_commitment_length {
            let commitment = reader
                .read_length_prefixed()
                .map_err(|e| TokenPrefixError::InvalidCommitment(e.to_string()))?;
            if commitment.is_empty() {
                return Err(TokenPrefixError::CommitmentLengthZero);
            }
            commitment.to_vec()
        } else {
            Vec::new()
        };
        let amount = if has_amount { read_token_amount(&mut reader)? } else { 0 };
        let token = Token {
            amount,
            category,
            nft: Some(Nft { capability, commitment }),
        };
        return Ok((Some(token), MINIMUM_PREFIX_LENGTH + reader.position()));
    }
    if capability != NftCapability::None {
        return Err(TokenPrefixError::CapabilityWithoutNft { bitfield });
    }
    if !has_amount {
        return Err(TokenPrefixError::NoTokens { bitfield });
    }
    let amount = read_token_amount(&mut reader)?;
    Ok((
        Some(Token::fungible(category, amount)),
        MINIMUM_PREFIX_LENGTH + reader.position(),
    ))
}

fn read_token_amount(reader: &mut BchReader) -> Result<u64, TokenPrefixError> {
    let amount = reader
        .read_compact_uint()
        .map_err(|e| TokenPrefixError::InvalidAmountEncoding(e.to_string()))?
        .value();
    if amount > MAXIMUM_TOKEN_AMOUNT {
        return Err(TokenPrefixError::ExcessiveAmount(amount));
    }
    if amount == 0 {
        return Err(TokenPrefixError::ZeroAmount);
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY: [u8; 32] = [0xbb; 32];

    #[test]
    fn test_no_prefix() {
        assert_eq!(read_token_prefix(&[0x51]).unwrap(), (None, 0));
        assert_eq!(read_token_prefix(&[]).unwrap(), (None, 0));
        assert!(encode_token_prefix(None).is_empty());
        assert!(encode_token_prefix(Some(&Token::fungible(CATEGORY, 0))).is_empty());
    }

    #[test]
    fn test_fungible_prefix() {
        let token = Token::fungible(CATEGORY, 1000);
        let encoded = encode_token_prefix(Some(&token));
        assert_eq!(encoded[0], PREFIX_TOKEN);
        assert_eq!(encoded[33], HAS_AMOUNT);
        assert_eq!(&encoded[34..], &[0xfd, 0xe8, 0x03]);
        let (decoded, length) = read_token_prefix(&encoded).unwrap();
        assert_eq!(decoded, Some(token));
        assert_eq!(length, encoded.len());
    }

    #[test]
    fn test_nft_prefix_with_commitment() {
        let token = Token {
            amount: 5,
            category: CATEGORY,
            nft: Some(Nft {
                capability: NftCapability::Minting,
                commitment: vec![0x01, 0x02],
            }),
        };
        let encoded = encode_token_prefix(Some(&token));
        assert_eq!(encoded[33], HAS_NFT | HAS_COMMITMENT_LENGTH | HAS_AMOUNT | 2);
        let mut field = encoded.clone();
        field.extend_from_slice(&[0x76, 0xa9]);
        let (decoded, length) = read_token_prefix(&field).unwrap();
        assert_eq!(decoded, Some(token));
        assert_eq!(&field[length..], &[0x76, 0xa9]);
    }

    #[test]
    fn test_category_is_reversed_on_the_wire() {
        let mut category = [0u8; 32];
        category[0] = 0xaa;
        let encoded = encode_token_prefix(Some(&Token::fungible(category, 1)));
        assert_eq!(encoded[32], 0xaa);
    }

    #[test]
    fn test_invalid_prefixes() {
        let mut base = vec![PREFIX_TOKEN];
        base.extend_from_slice(&CATEGORY);

        assert_eq!(
            read_token_prefix(&base).unwrap_err(),
            TokenPrefixError::InsufficientLength { missing: 1 }
        );

        let with_bitfield = |bitfield: u8, rest: &[u8]| {
            let mut field = base.clone();
            field.push(bitfield);
            field.extend_from_slice(rest);
            read_token_prefix(&field)
        };
        assert_eq!(
            with_bitfield(0x80 | HAS_NFT, &[]).unwrap_err(),
            TokenPrefixError::ReservedBit { bitfield: 0xa0 }
        );
        assert_eq!(
            with_bitfield(HAS_NFT | 3, &[]).unwrap_err(),
            TokenPrefixError::InvalidCapability { capability: 3 }
        );
        assert_eq!(
            with_bitfield(HAS_COMMITMENT_LENGTH | HAS_AMOUNT, &[1]).unwrap_err(),
            TokenPrefixError::CommitmentWithoutNft { bitfield: 0x50 }
        );
        assert_eq!(
            with_bitfield(HAS_AMOUNT | 1, &[1]).unwrap_err(),
            TokenPrefixError::CapabilityWithoutNft { bitfield: 0x11 }
        );
        assert_eq!(
            with_bitfield(HAS_NFT | HAS_COMMITMENT_LENGTH, &[0]).unwrap_err(),
            TokenPrefixError::CommitmentLengthZero
        );
        assert_eq!(
            with_bitfield(HAS_AMOUNT, &[0]).unwrap_err(),
            TokenPrefixError::ZeroAmount
        );
        assert_eq!(
            with_bitfield(0, &[]).unwrap_err(),
            TokenPrefixError::NoTokens { bitfield: 0 }
        );
        let excessive = [0xff, 0, 0, 0, 0, 0, 0, 0, 0x80];
        assert_eq!(
            with_bitfield(HAS_AMOUNT, &excessive).unwrap_err(),
            TokenPrefixError::ExcessiveAmount(1 << 63)
        );
        assert!(matches!(
            with_bitfield(HAS_AMOUNT, &[0xfd, 0x01, 0x00]).unwrap_err(),
            TokenPrefixError::InvalidAmountEncoding(_)
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TokenPrefixError::ReservedBit { bitfield: 0xa0 }.to_string(),
            "Invalid token prefix: reserved bit is set. Bitfield: 0b10100000"
        );
        assert_eq!(
            TokenPrefixError::InsufficientLength { missing: 2 }.to_string(),
            "Invalid token prefix: insufficient length. The minimum possible length is 34. Missing bytes: 2"
        );
    }
}
