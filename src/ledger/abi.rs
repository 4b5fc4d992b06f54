/// Minimal Solidity ABI encoding for the registry contract
///
/// Covers exactly the types the registry uses: `address`, `bytes32`,
/// `uint256`, `bool` and `string`. Static values occupy one 32-byte head
/// word; a string's head word is the byte offset of its tail, where the
/// length word and the right-padded bytes live.
use crate::{
    address::Address,
    error::{ArcIdError, ArcIdResult, UpstreamService},
    hashing::{keccak256, Digest32},
};

const WORD: usize = 32;

/// A single ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bytes32(Digest32),
    Uint(u128),
    Bool(bool),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }
}

/// 4-byte function selector: first bytes of keccak(signature)
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Selector followed by the encoded arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens));
    out
}

/// Encode a token sequence as a tuple
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend(uint_word((head_len + tail.len()) as u128));
            if let Token::String(s) = token {
                tail.extend(uint_word(s.len() as u128));
                tail.extend_from_slice(s.as_bytes());
                let padding = (WORD - s.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        } else {
            head.extend(static_word(token));
        }
    }

    head.extend(tail);
    head
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn static_word(token: &Token) -> [u8; WORD] {
    match token {
        Token::Address(addr) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(&addr.to_bytes());
            word
        }
        Token::Bytes32(bytes) => *bytes,
        Token::Uint(v) => uint_word(*v),
        Token::Bool(b) => uint_word(u128::from(*b)),
        Token::String(_) => [0u8; WORD],
    }
}

fn malformed(reason: impl Into<String>) -> ArcIdError {
    ArcIdError::upstream(
        UpstreamService::Ledger,
        format!("malformed ABI return data: {}", reason.into()),
    )
}

/// Reader over ABI-encoded return data
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> ArcIdResult<&'a [u8]> {
        offset
            .checked_add(WORD)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| malformed(format!("word at byte {} out of range", offset)))
    }

    fn word(&self, index: usize) -> ArcIdResult<&'a [u8]> {
        self.word_at(index * WORD)
    }

    /// Unsigned integer that must fit in 128 bits
    pub fn uint(&self, index: usize) -> ArcIdResult<u128> {
        let word = self.word(index)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(malformed(format!("uint at slot {} exceeds 128 bits", index)));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(buf))
    }

    pub fn boolean(&self, index: usize) -> ArcIdResult<bool> {
        match self.uint(index)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(malformed(format!("bool at slot {} is {}", index, other))),
        }
    }

    pub fn bytes32(&self, index: usize) -> ArcIdResult<Digest32> {
        let mut out = [0u8; WORD];
        out.copy_from_slice(self.word(index)?);
        Ok(out)
    }

    pub fn string(&self, index: usize) -> ArcIdResult<String> {
        let offset = usize::try_from(self.uint(index)?)
            .map_err(|_| malformed("string offset too large"))?;
        let len_word = self.word_at(offset)?;
        if len_word[..24].iter().any(|b| *b != 0) {
            return Err(malformed("string length exceeds 64 bits"));
        }
        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&len_word[24..]);
        let len = usize::try_from(u64::from_be_bytes(len_buf))
            .map_err(|_| malformed("string length too large"))?;

        // offset + WORD cannot overflow once word_at succeeded
        let start = offset + WORD;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| malformed("string bytes out of range"))?;
        String::from_utf8(bytes.to_vec()).map_err(|_| malformed("string is not UTF-8"))
    }
}
