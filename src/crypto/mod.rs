/// Cryptography module for the registry signer and wallet signatures
///
/// Handles secp256k1 signing of registry transactions and recovery of the
/// signer behind a wallet's personal-message signature

pub mod eth;

pub use eth::{recover_personal_signer, EthSigner};
