/// EIP-155 legacy transactions
use crate::{
    address::Address,
    crypto::{eth::RecoverableSignature, EthSigner},
    error::ArcIdResult,
    hashing::{keccak256, Digest32},
    ledger::rlp,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u128,
    pub gas_price: u128,
    pub gas_limit: u128,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_uint(self.nonce),
            rlp::encode_uint(self.gas_price),
            rlp::encode_uint(self.gas_limit),
            rlp::encode_bytes(&self.to.to_bytes()),
            rlp::encode_uint(self.value),
            rlp::encode_bytes(&self.data),
        ]
    }

    /// RLP payload that gets hashed and signed: fields plus (chain_id, 0, 0)
    pub fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        let mut fields = self.base_fields();
        fields.push(rlp::encode_uint(u128::from(chain_id)));
        fields.push(rlp::encode_uint(0));
        fields.push(rlp::encode_uint(0));
        rlp::encode_list(&fields)
    }

    pub fn signing_hash(&self, chain_id: u64) -> Digest32 {
        keccak256(&self.signing_payload(chain_id))
    }

    /// Raw signed transaction, ready for `eth_sendRawTransaction`
    pub fn encode_signed(&self, chain_id: u64, signature: &RecoverableSignature) -> Vec<u8> {
        let v = u128::from(chain_id) * 2 + 35 + u128::from(signature.recovery_id);
        let mut fields = self.base_fields();
        fields.push(rlp::encode_uint(v));
        fields.push(rlp::encode_scalar(&signature.r));
        fields.push(rlp::encode_scalar(&signature.s));
        rlp::encode_list(&fields)
    }

    pub fn sign(&self, signer: &EthSigner, chain_id: u64) -> ArcIdResult<Vec<u8>> {
        let signature = signer.sign_prehash(&self.signing_hash(chain_id))?;
        Ok(self.encode_signed(chain_id, &signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::eth::address_of;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    // Example transaction from EIP-155
    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Address::parse("0x3535353535353535353535353535353535353535").unwrap(),
            value: 1_000_000_000_000_000_000,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_eip155_signing_payload_and_hash() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_payload(1)),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.signing_hash(1)),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_signature_recovers_signer() {
        let signer = EthSigner::new(&[0x46u8; 32]).unwrap();
        let tx = eip155_example();
        let hash = tx.signing_hash(1);
        let sig = signer.sign_prehash(&hash).unwrap();

        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&sig.r);
        rs[32..].copy_from_slice(&sig.s);
        let signature = Signature::from_slice(&rs).unwrap();
        let recovery_id = RecoveryId::from_byte(sig.recovery_id).unwrap();
        let key = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id).unwrap();

        assert_eq!(&address_of(&key), signer.address());
        // EIP-155 example key 0x4646... controls this address
        assert_eq!(
            signer.address().as_str(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn test_signed_encoding_carries_chain_id_in_v() {
        let signer = EthSigner::new(&[0x46u8; 32]).unwrap();
        let raw = eip155_example().sign(&signer, 1).unwrap();
        // long-list prefix plus one length byte
        assert_eq!(raw[0], 0xf8);
        assert_eq!(raw[1] as usize, raw.len() - 2);
        // the six unsigned fields take 41 bytes, then v = 37 or 38
        let v = raw[2 + 41];
        assert!(v == 0x25 || v == 0x26);
    }
}
