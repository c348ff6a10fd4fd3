//! Whole-transaction CashToken validation.
//!
//! Token categories are compared as hex strings of the category in user
//! interface order, which is also the order of outpoint transaction hashes
//! (genesis inputs create the category of their outpoint hash).

use std::collections::BTreeMap;

use bch_transaction::{NftCapability, Output, Transaction};

use crate::consensus::MAXIMUM_TOKEN_COMMITMENT_LENGTH;

const PREFIX: &str = "Transaction violates token validation:";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImmutableToken {
    category: String,
    commitment: Vec<u8>,
}

#[derive(Debug, Default)]
struct TokenSummary {
    immutable: Vec<ImmutableToken>,
    mutable_by_category: BTreeMap<String, i64>,
    sums_by_category: BTreeMap<String, u128>,
    minting_categories: Vec<String>,
}

fn summarize(outputs: &[Output]) -> TokenSummary {
    let mut summary = TokenSummary::default();
    for token in outputs.iter().filter_map(|output| output.token.as_ref()) {
        let category = hex::encode(token.category);
        match token.nft.as_ref() {
            Some(nft) if nft.capability == NftCapability::None => summary.immutable.push(ImmutableToken {
                category: category.clone(),
                commitment: nft.commitment.clone(),
            }),
            Some(nft) if nft.capability == NftCapability::Mutable => {
                *summary.mutable_by_category.entry(category.clone()).or_default() += 1;
            }
            Some(_) => summary.minting_categories.push(category.clone()),
            None => {}
        }
        *summary.sums_by_category.entry(category).or_default() += u128::from(token.amount);
    }
    summary
}

/// Verify the token rules of a transaction: commitment lengths, minting
/// authority, fungible token conservation and NFT creation.
///
/// # Arguments
/// * `transaction` - The spending transaction.
/// * `source_outputs` - The outputs spent by each input.
/// * `maximum_commitment_length` - The largest allowed NFT commitment.
///
/// # Returns
/// `Ok(())` if the transaction is valid, otherwise a description of the
/// first violated rule.
pub fn verify_transaction_tokens(
    transaction: &Transaction,
    source_outputs: &[Output],
    maximum_commitment_length: usize,
) -> Result<(), String> {
    let excessive_commitment = source_outputs
        .iter()
        .chain(&transaction.outputs)
        .filter_map(|output| output.token.as_ref()?.nft.as_ref())
        .find(|nft| nft.commitment.len() > maximum_commitment_length);
    if let Some(nft) = excessive_commitment {
        return Err(format!(
            "{} a token commitment exceeds the consensus limit of {} bytes. Excessive token commitment length: {}",
            PREFIX,
            maximum_commitment_length,
            nft.commitment.len()
        ));
    }

    let genesis_categories = transaction
        .inputs
        .iter()
        .filter(|input| input.outpoint_index == 0)
        .map(|input| hex::encode(input.outpoint_transaction_hash))
        .collect::<Vec<_>>();
    let available = summarize(source_outputs);
    let created = summarize(&transaction.outputs);
    let minting_categories = genesis_categories
        .iter()
        .chain(&available.minting_categories)
        .cloned()
        .collect::<Vec<_>>();

    if let Some(category) = created
        .minting_categories
        .iter()
        .find(|category| !minting_categories.contains(category))
    {
        return Err(format!(
            "{} the transaction outputs include a minting token that is not substantiated by the transaction's inputs. Invalid output minting token category: {}",
            PREFIX, category
        ));
    }

    for (category, &sum) in &created.sums_by_category {
        if sum > i64::MAX as u128 {
            return Err(format!(
                "{} the transaction outputs include a sum of fungible tokens for a category exceeding the maximum supply ({}). Category: {}, total amount: {}.",
                PREFIX,
                i64::MAX,
                category,
                sum
            ));
        }
        match available.sums_by_category.get(category) {
            None if sum > 0 && !genesis_categories.contains(category) => {
                return Err(format!(
                    "{} the transaction creates new fungible tokens for a category without a matching genesis input. Category: {}, tokens created: {}",
                    PREFIX, category, sum
                ));
            }
            Some(&available_sum) if sum > available_sum => {
                return Err(format!(
                    "{} the sum of fungible tokens in the transaction's outputs exceed that of the transactions inputs for a category. Category: {}, input amount: {}, output amount: {}",
                    PREFIX, category, available_sum, sum
                ));
            }
            _ => {}
        }
    }

    let mut remaining_mutable = available.mutable_by_category.clone();
    for (category, &count) in &created.mutable_by_category {
        if !minting_categories.contains(category) {
            *remaining_mutable.entry(category.clone()).or_default() -= count;
        }
    }
    if let Some((category, &remaining)) = remaining_mutable.iter().find(|(_, remaining)| **remaining < 0) {
        return Err(format!(
            "{} the transaction creates more mutable tokens than are available for a category without a matching minting token. Category: {}, excess mutable tokens: {}",
            PREFIX, category, -remaining
        ));
    }

    let mut available_immutable = available.immutable;
    let mut required_mutable = BTreeMap::<String, i64>::new();
    for token in created
        .immutable
        .iter()
        .filter(|token| !minting_categories.contains(&token.category))
    {
        match available_immutable.iter().position(|available| available == token) {
            Some(index) => {
                available_immutable.remove(index);
            }
            None => *required_mutable.entry(token.category.clone()).or_default() += 1,
        }
    }
    for (category, &required) in &required_mutable {
        let available_mutable = remaining_mutable.get(category).copied().unwrap_or(0);
        if available_mutable < required {
            return Err(format!(
                "{} the transaction creates an immutable token for a category without a matching minting token or sufficient mutable tokens. Category {}, available mutable tokens: {}, new immutable tokens: {}",
                PREFIX, category, available_mutable, required
            ));
        }
    }
    Ok(())
}

/// [`verify_transaction_tokens`] with the consensus commitment limit.
pub fn verify_transaction_tokens_default(transaction: &Transaction, source_outputs: &[Output]) -> Result<(), String> {
    verify_transaction_tokens(transaction, source_outputs, MAXIMUM_TOKEN_COMMITMENT_LENGTH)
}

#[cfg(test)]
mod tests {
    use bch_transaction::{Input, Token};

    use super::*;

    fn category(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    fn with_token(token: Token) -> Output {
        let mut output = Output::new(1000, vec![0x51]);
        output.token = Some(token);
        output
    }

    fn transaction(inputs: Vec<Input>, outputs: Vec<Output>) -> Transaction {
        let mut transaction = Transaction::new();
        transaction.inputs = inputs;
        transaction.outputs = outputs;
        transaction
    }

    fn input(hash: [u8; 32], index: u32) -> Input {
        Input {
            outpoint_index: index,
            outpoint_transaction_hash: hash,
            ..Input::default()
        }
    }

    #[test]
    fn test_genesis_allows_new_category() {
        let tx = transaction(
            vec![input(category(7), 0)],
            vec![with_token(Token::fungible(category(7), 1_000))],
        );
        assert!(verify_transaction_tokens_default(&tx, &[Output::new(5000, vec![])]).is_ok());
    }

    #[test]
    fn test_fungible_tokens_require_genesis() {
        let tx = transaction(
            vec![input(category(7), 1)],
            vec![with_token(Token::fungible(category(7), 1_000))],
        );
        let error = verify_transaction_tokens_default(&tx, &[Output::new(5000, vec![])]).unwrap_err();
        assert!(error.contains("without a matching genesis input"), "{}", error);
    }

    #[test]
    fn test_fungible_inflation_rejected() {
        let tx = transaction(
            vec![input(category(1), 1)],
            vec![with_token(Token::fungible(category(7), 101))],
        );
        let spent = [with_token(Token::fungible(category(7), 100))];
        let error = verify_transaction_tokens_default(&tx, &spent).unwrap_err();
        assert!(error.contains("input amount: 100, output amount: 101"), "{}", error);
    }

    #[test]
    fn test_minting_requires_authority() {
        let tx = transaction(
            vec![input(category(1), 1)],
            vec![with_token(Token::non_fungible(category(7), NftCapability::Minting, vec![]))],
        );
        let error = verify_transaction_tokens_default(&tx, &[Output::new(5000, vec![])]).unwrap_err();
        assert!(error.contains("Invalid output minting token category"), "{}", error);
    }

    #[test]
    fn test_mutable_token_may_become_immutable() {
        let tx = transaction(
            vec![input(category(1), 1)],
            vec![with_token(Token::non_fungible(category(7), NftCapability::None, vec![0x01]))],
        );
        let spent = [with_token(Token::non_fungible(category(7), NftCapability::Mutable, vec![]))];
        assert!(verify_transaction_tokens_default(&tx, &spent).is_ok());
    }

    #[test]
    fn test_immutable_tokens_are_conserved() {
        let tx = transaction(
            vec![input(category(1), 1)],
            vec![
                with_token(Token::non_fungible(category(7), NftCapability::None, vec![0x01])),
                with_token(Token::non_fungible(category(7), NftCapability::None, vec![0x01])),
            ],
        );
        let spent = [with_token(Token::non_fungible(category(7), NftCapability::None, vec![0x01]))];
        let error = verify_transaction_tokens_default(&tx, &spent).unwrap_err();
        assert!(error.contains("available mutable tokens: 0, new immutable tokens: 1"), "{}", error);
    }

    #[test]
    fn test_excessive_commitment() {
        let tx = transaction(
            vec![input(category(7), 0)],
            vec![with_token(Token::non_fungible(category(7), NftCapability::None, vec![0; 41]))],
        );
        let error = verify_transaction_tokens_default(&tx, &[Output::new(5000, vec![])]).unwrap_err();
        assert!(error.ends_with("Excessive token commitment length: 41"), "{}", error);
    }
}
