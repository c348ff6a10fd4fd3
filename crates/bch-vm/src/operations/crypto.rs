//! Hashing and signature checking operations.

use bch_primitives::hash::{hash160_with, hash256_with};
use bch_transaction::signing_serialization::generate_signing_serialization_for_program;

use crate::consensus::Capabilities;
use crate::encoding::{
    decode_transaction_signature, is_valid_public_key_encoding, is_valid_signature_encoding_raw,
    is_valid_signature_encoding_transaction, SCHNORR_SIGNATURE_LENGTH,
};
use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::{ProgramState, SignedMessage};

/// The hash functions available to bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFunction {
    Ripemd160,
    Sha1,
    Sha256,
    Hash160,
    Hash256,
}

impl ProgramState {
    pub(crate) fn op_hash(&mut self, function: HashFunction, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        let item = self.pop()?;
        let (digest, double) = match function {
            HashFunction::Ripemd160 => (capabilities.ripemd160.hash(&item).to_vec(), false),
            HashFunction::Sha1 => (capabilities.sha1.hash(&item).to_vec(), false),
            HashFunction::Sha256 => (capabilities.sha256.hash(&item).to_vec(), false),
            HashFunction::Hash160 => (
                hash160_with(capabilities.sha256.as_ref(), capabilities.ripemd160.as_ref(), &item).to_vec(),
                true,
            ),
            HashFunction::Hash256 => (hash256_with(capabilities.sha256.as_ref(), &item).to_vec(), true),
        };
        self.count_hash_digest_iterations(item.len(), double);
        self.push(digest);
        Ok(())
    }

    pub(crate) fn op_code_separator(&mut self) -> Result<(), AuthenticationError> {
        self.last_code_separator = Some(self.ip);
        Ok(())
    }

    /// Hash the signing serialization for `signing_serialization_type`,
    /// recording the signed message.
    fn signature_digest(
        &mut self,
        signing_serialization_type: u8,
        capabilities: &Capabilities,
    ) -> Result<[u8; 32], AuthenticationError> {
        let covered_bytecode = self.active_bytecode();
        let serialization = generate_signing_serialization_for_program(
            &self.program,
            &covered_bytecode,
            signing_serialization_type,
            capabilities.sha256.as_ref(),
        )
        .map_err(|e| AuthenticationError::with_details(AuthenticationErrorCode::InvalidTransactionUtxoIndex, e.to_string()))?;
        self.count_hash_digest_iterations(serialization.len(), true);
        let digest = hash256_with(capabilities.sha256.as_ref(), &serialization);
        self.signed_messages.push(SignedMessage { digest, serialization });
        Ok(digest)
    }

    fn check_transaction_signature_encoding(&self, signature: &[u8]) -> Result<(), AuthenticationError> {
        if is_valid_signature_encoding_transaction(signature, self.consensus.signing_serialization_types) {
            Ok(())
        } else {
            Err(AuthenticationError::with_details(
                AuthenticationErrorCode::InvalidSignatureEncoding,
                format!(
                    "Transaction signature (including signing serialization): {}",
                    hex::encode(signature)
                ),
            ))
        }
    }

    pub(crate) fn op_check_sig(&mut self, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        let [signature, public_key] = self.pop_items::<2>()?;
        if !is_valid_public_key_encoding(&public_key) {
            return Err(AuthenticationErrorCode::InvalidPublicKeyEncoding.into());
        }
        self.check_transaction_signature_encoding(&signature)?;
        let (raw, signing_serialization_type) = decode_transaction_signature(&signature);
        let digest = self.signature_digest(signing_serialization_type, capabilities)?;
        let success = if raw.len() == SCHNORR_SIGNATURE_LENGTH {
            capabilities.secp256k1.verify_signature_schnorr(raw, &public_key, &digest)
        } else {
            capabilities.secp256k1.verify_signature_der_low_s(raw, &public_key, &digest)
        };
        if !success && !raw.is_empty() {
            return Err(AuthenticationErrorCode::NonNullSignatureFailure.into());
        }
        self.push_bool(success);
        Ok(())
    }

    pub(crate) fn op_check_sig_verify(&mut self, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        self.op_check_sig(capabilities)?;
        self.op_verify()
    }

    /// `OP_CHECKMULTISIG`.
    ///
    /// An empty protocol bug value selects legacy ECDSA mode, where
    /// signatures are matched against public keys in order. A non-empty
    /// value is a bitfield selecting which public keys are checked, and
    /// every signature must then be a Schnorr signature.
    pub(crate) fn op_check_multisig(&mut self, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        let key_count = self.pop_index(AuthenticationErrorCode::InvalidNaturalNumber)?;
        if key_count > self.consensus.maximum_multisig_public_keys {
            return Err(AuthenticationErrorCode::ExceedsMaximumMultisigPublicKeyCount.into());
        }
        let public_keys = self.pop_multiple(key_count, AuthenticationErrorCode::InvalidStackIndex)?;
        self.operation_count += key_count;
        if let Some(maximum) = self.consensus.maximum_operation_count {
            if self.operation_count > maximum {
                return Err(AuthenticationErrorCode::ExceededMaximumOperationCount.into());
            }
        }
        let signature_count = self.pop_index(AuthenticationErrorCode::InvalidNaturalNumber)?;
        if signature_count > key_count {
            return Err(AuthenticationErrorCode::InsufficientPublicKeys.into());
        }
        let signatures = self.pop_multiple(signature_count, AuthenticationErrorCode::InvalidStackIndex)?;
        let protocol_bug_value = self.pop()?;

        let success = if protocol_bug_value.is_empty() {
            self.verify_multisig_legacy(&public_keys, &signatures, capabilities)?
        } else {
            self.verify_multisig_schnorr(&public_keys, &signatures, &protocol_bug_value, capabilities)?
        };
        if !success && signatures.iter().any(|signature| !signature.is_empty()) {
            return Err(AuthenticationErrorCode::NonNullSignatureFailure.into());
        }
        self.push_bool(success);
        Ok(())
    }

    pub(crate) fn op_check_multisig_verify(&mut self, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        self.op_check_multisig(capabilities)?;
        self.op_verify()
    }

    /// Pop `count` items, returned in stack order.
    fn pop_multiple(&mut self, count: usize, code: AuthenticationErrorCode) -> Result<Vec<Vec<u8>>, AuthenticationError> {
        let start = self.stack.len().checked_sub(count).ok_or(AuthenticationError::from(code))?;
        Ok(self.stack.split_off(start))
    }

    fn verify_multisig_legacy(
        &mut self,
        public_keys: &[Vec<u8>],
        signatures: &[Vec<u8>],
        capabilities: &Capabilities,
    ) -> Result<bool, AuthenticationError> {
        let mut remaining_signatures = signatures.len();
        let mut remaining_keys = public_keys.len();
        while remaining_signatures > 0 {
            if remaining_signatures > remaining_keys {
                return Ok(false);
            }
            let public_key = &public_keys[remaining_keys - 1];
            let signature = &signatures[remaining_signatures - 1];
            if !is_valid_public_key_encoding(public_key) {
                return Err(AuthenticationErrorCode::InvalidPublicKeyEncoding.into());
            }
            self.check_transaction_signature_encoding(signature)?;
            let (raw, signing_serialization_type) = decode_transaction_signature(signature);
            if raw.len() == SCHNORR_SIGNATURE_LENGTH {
                return Err(AuthenticationErrorCode::SchnorrSizedSignatureInCheckMultiSig.into());
            }
            let digest = self.signature_digest(signing_serialization_type, capabilities)?;
            if capabilities.secp256k1.verify_signature_der_low_s(raw, public_key, &digest) {
                remaining_signatures -= 1;
            }
            remaining_keys -= 1;
        }
        Ok(true)
    }

    fn verify_multisig_schnorr(
        &mut self,
        public_keys: &[Vec<u8>],
        signatures: &[Vec<u8>],
        bitfield: &[u8],
        capabilities: &Capabilities,
    ) -> Result<bool, AuthenticationError> {
        let key_count = public_keys.len();
        let selected = (0..bitfield.len() * 8)
            .filter(|&bit| bitfield[bit / 8] & (1 << (bit % 8)) != 0)
            .collect::<Vec<_>>();
        let valid_bitfield = bitfield.len() == (key_count + 7) / 8
            && selected.len() == signatures.len()
            && selected.iter().all(|&bit| bit < key_count);
        if !valid_bitfield {
            return Err(AuthenticationErrorCode::InvalidMultisigBitfield.into());
        }
        for (signature, &key_index) in signatures.iter().zip(&selected) {
            let public_key = &public_keys[key_index];
            if !is_valid_public_key_encoding(public_key) {
                return Err(AuthenticationErrorCode::InvalidPublicKeyEncoding.into());
            }
            self.check_transaction_signature_encoding(signature)?;
            let (raw, signing_serialization_type) = decode_transaction_signature(signature);
            if raw.len() != SCHNORR_SIGNATURE_LENGTH {
                return Err(AuthenticationErrorCode::InvalidSignatureEncoding.into());
            }
            let digest = self.signature_digest(signing_serialization_type, capabilities)?;
            if !capabilities.secp256k1.verify_signature_schnorr(raw, public_key, &digest) {
                return Err(AuthenticationErrorCode::NonNullSignatureFailure.into());
            }
        }
        Ok(true)
    }

    /// `OP_CHECKDATASIG`: verify a signature over the SHA-256 of an
    /// arbitrary message.
    pub(crate) fn op_check_data_sig(&mut self, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        let [signature, message, public_key] = self.pop_items::<3>()?;
        if !is_valid_public_key_encoding(&public_key) {
            return Err(AuthenticationErrorCode::InvalidPublicKeyEncoding.into());
        }
        if !is_valid_signature_encoding_raw(&signature) {
            return Err(AuthenticationError::with_details(
                AuthenticationErrorCode::InvalidSignatureEncoding,
                format!("Data signature: {}", hex::encode(&signature)),
            ));
        }
        self.count_hash_digest_iterations(message.len(), false);
        let digest = capabilities.sha256.hash(&message);
        let success = if signature.len() == SCHNORR_SIGNATURE_LENGTH {
            capabilities.secp256k1.verify_signature_schnorr(&signature, &public_key, &digest)
        } else {
            capabilities.secp256k1.verify_signature_der_low_s(&signature, &public_key, &digest)
        };
        self.signed_messages.push(SignedMessage {
            digest,
            serialization: message,
        });
        if !success && !signature.is_empty() {
            return Err(AuthenticationErrorCode::NonNullSignatureFailure.into());
        }
        self.push_bool(success);
        Ok(())
    }

    pub(crate) fn op_check_data_sig_verify(&mut self, capabilities: &Capabilities) -> Result<(), AuthenticationError> {
        self.op_check_data_sig(capabilities)?;
        self.op_verify()
    }
}
