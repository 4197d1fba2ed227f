//! Unsigned transfer transaction construction.
//!
//! A checkout resolves into a [`TransferPlan`] (native lamports or token
//! base units, split into merchant and fee legs) and a single emission
//! routine turns the plan into an ordered instruction list:
//!
//! 1. payer-funded holding-account creation for any missing destination
//!    accounts (tokens only; creation always precedes the transfer that
//!    targets it),
//! 2. the merchant transfer, carrying the correlation key as an extra
//!    non-signing read-only account so the settled transaction can be found
//!    by address lookup,
//! 3. the treasury fee transfer when fee routing is enabled,
//! 4. an optional memo tagging the transaction with an opaque
//!    storefront/product reference.
//!
//! The result is an **unsigned** v0 transaction with the payer as fee
//! payer; signing and broadcasting are entirely the wallet's business.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use solana_message::v0::Message as MessageV0;
use solana_message::VersionedMessage;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::instruction::AccountMeta;
use spl_token::solana_program::program_pack::Pack;

use paytill::correlation::CorrelationKey;
use paytill::fees::{FeeBreakdown, FeeConfig};
use paytill::intent::{AssetKind, NATIVE_DECIMALS};

use crate::error::BuildError;
use crate::rpc::NetworkQuery;

/// System program public key.
pub const SYSTEM_PROGRAM_PUBKEY: Pubkey = pubkey!("11111111111111111111111111111111");

/// Associated Token Account program public key.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Memo program public key.
pub const MEMO_PROGRAM_PUBKEY: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// A checkout to turn into an unsigned transaction.
#[derive(Debug)]
pub struct TransferRequest<'a> {
    /// The paying wallet; also the transaction fee payer.
    pub payer: Pubkey,
    /// The merchant's receiving account.
    pub merchant: Pubkey,
    /// Listed price in the asset's display unit. Must be positive.
    pub amount: Decimal,
    /// Settlement asset.
    pub asset: AssetKind,
    /// Single-use key to embed; generating one per build is the caller's
    /// contract, reuse is a caller error.
    pub correlation: &'a CorrelationKey,
    /// Optional opaque reference recorded on-chain for auditability.
    pub memo: Option<String>,
}

/// The two shapes a transfer can take, sharing one emission routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan {
    /// Direct lamport transfers.
    Native {
        /// Merchant leg in lamports.
        merchant_base: u64,
        /// Treasury leg in lamports (0 when routing is off).
        fee_base: u64,
    },
    /// SPL Token / Token-2022 transfers between holding accounts.
    Token {
        /// The token's mint address.
        mint: Pubkey,
        /// Owning token program (Token or Token-2022).
        token_program: Pubkey,
        /// Mint decimal precision.
        decimals: u8,
        /// Merchant leg in base units.
        merchant_base: u64,
        /// Treasury leg in base units (0 when routing is off).
        fee_base: u64,
    },
}

impl TransferPlan {
    /// Resolves an asset and a listed price into a concrete plan plus the
    /// fee breakdown it was derived from.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::AssetResolution`] for an unresolvable mint,
    /// [`BuildError::NetworkUnavailable`] when the metadata lookup fails,
    /// and [`BuildError::InvalidAmount`] when the merchant leg rounds to
    /// zero base units.
    pub async fn resolve<N: NetworkQuery + ?Sized>(
        network: &N,
        fees: &FeeConfig,
        asset: &AssetKind,
        amount: Decimal,
    ) -> Result<(Self, FeeBreakdown), BuildError> {
        match asset {
            AssetKind::Sol => {
                let split = fees.split(amount, NATIVE_DECIMALS);
                let merchant_base = to_base_units(split.merchant, NATIVE_DECIMALS)
                    .filter(|base| *base > 0)
                    .ok_or(BuildError::InvalidAmount(amount))?;
                let fee_base = to_base_units(split.fee, NATIVE_DECIMALS).unwrap_or(0);
                Ok((
                    Self::Native {
                        merchant_base,
                        fee_base,
                    },
                    split,
                ))
            }
            AssetKind::Token { mint } => {
                let (decimals, token_program) = resolve_mint(network, mint).await?;
                let split = fees.split(amount, u32::from(decimals));
                let merchant_base = to_base_units(split.merchant, u32::from(decimals))
                    .filter(|base| *base > 0)
                    .ok_or(BuildError::InvalidAmount(amount))?;
                let fee_base = to_base_units(split.fee, u32::from(decimals)).unwrap_or(0);
                Ok((
                    Self::Token {
                        mint: *mint,
                        token_program,
                        decimals,
                        merchant_base,
                        fee_base,
                    },
                    split,
                ))
            }
        }
    }
}

/// An unsigned transaction together with the split it settles.
#[derive(Debug)]
pub struct BuiltTransfer {
    /// The unsigned transaction for the payer's wallet.
    pub transaction: VersionedTransaction,
    /// How the listed price was split.
    pub split: FeeBreakdown,
}

/// Builds the unsigned transfer transaction for a checkout.
///
/// Pure apart from read-only network lookups (mint metadata, holding
/// account existence, recent blockhash). Never signs, never broadcasts,
/// never holds funds.
///
/// # Errors
///
/// Returns [`BuildError`] when the asset cannot be resolved, the network is
/// unreachable, the amount is not positive, or message compilation fails.
pub async fn build_transfer<N: NetworkQuery + ?Sized>(
    network: &N,
    fees: &FeeConfig,
    request: TransferRequest<'_>,
) -> Result<BuiltTransfer, BuildError> {
    let (plan, split) = TransferPlan::resolve(network, fees, &request.asset, request.amount).await?;

    let mut instructions = Vec::with_capacity(5);
    match plan {
        TransferPlan::Native {
            merchant_base,
            fee_base,
        } => {
            let mut transfer =
                system_transfer_instruction(&request.payer, &request.merchant, merchant_base);
            transfer
                .accounts
                .push(AccountMeta::new_readonly(*request.correlation.pubkey(), false));
            instructions.push(transfer);

            if let Some(treasury) = fees.treasury() {
                if fee_base > 0 {
                    instructions.push(system_transfer_instruction(
                        &request.payer,
                        treasury,
                        fee_base,
                    ));
                }
            }
        }
        TransferPlan::Token {
            mint,
            token_program,
            decimals,
            merchant_base,
            fee_base,
        } => {
            let source = associated_token_account(&request.payer, &mint, &token_program);
            let merchant_ata =
                associated_token_account(&request.merchant, &mint, &token_program);

            if holding_account_missing(network, &merchant_ata).await? {
                instructions.push(create_holding_account_instruction(
                    &request.payer,
                    &request.merchant,
                    &mint,
                    &token_program,
                ));
            }

            let treasury_leg = match fees.treasury() {
                Some(treasury) if fee_base > 0 => {
                    let treasury_ata = associated_token_account(treasury, &mint, &token_program);
                    if holding_account_missing(network, &treasury_ata).await? {
                        instructions.push(create_holding_account_instruction(
                            &request.payer,
                            treasury,
                            &mint,
                            &token_program,
                        ));
                    }
                    Some(treasury_ata)
                }
                _ => None,
            };

            let mut transfer = token_transfer_instruction(
                &token_program,
                &source,
                &mint,
                &merchant_ata,
                &request.payer,
                merchant_base,
                decimals,
            )?;
            transfer
                .accounts
                .push(AccountMeta::new_readonly(*request.correlation.pubkey(), false));
            instructions.push(transfer);

            if let Some(treasury_ata) = treasury_leg {
                instructions.push(token_transfer_instruction(
                    &token_program,
                    &source,
                    &mint,
                    &treasury_ata,
                    &request.payer,
                    fee_base,
                    decimals,
                )?);
            }
        }
    }

    if let Some(memo) = &request.memo {
        instructions.push(Instruction {
            program_id: MEMO_PROGRAM_PUBKEY,
            accounts: vec![],
            data: memo.as_bytes().to_vec(),
        });
    }

    let recent_blockhash = network
        .latest_blockhash()
        .await
        .map_err(|e| BuildError::NetworkUnavailable(e.to_string()))?;
    let message = MessageV0::try_compile(&request.payer, &instructions, &[], recent_blockhash)
        .map_err(|e| BuildError::Compile(format!("{e:?}")))?;
    let num_required = message.header.num_required_signatures;

    let transaction = VersionedTransaction {
        signatures: vec![Signature::default(); num_required as usize],
        message: VersionedMessage::V0(message),
    };

    Ok(BuiltTransfer { transaction, split })
}

/// Encodes a transaction for the HTTP boundary.
///
/// # Errors
///
/// Returns [`BuildError::Compile`] when serialization fails.
pub fn encode_base64(transaction: &VersionedTransaction) -> Result<String, BuildError> {
    let bytes =
        bincode::serialize(transaction).map_err(|e| BuildError::Compile(e.to_string()))?;
    Ok(b64.encode(bytes))
}

/// Derives the associated token account for an owner and mint.
#[must_use]
pub fn associated_token_account(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Fetches a mint's decimals and owning token program.
async fn resolve_mint<N: NetworkQuery + ?Sized>(
    network: &N,
    mint: &Pubkey,
) -> Result<(u8, Pubkey), BuildError> {
    let account = network
        .get_account(mint)
        .await
        .map_err(|e| BuildError::NetworkUnavailable(e.to_string()))?
        .ok_or_else(|| BuildError::AssetResolution {
            mint: *mint,
            reason: "mint account not found".to_owned(),
        })?;

    if account.owner == spl_token::id() {
        let state = spl_token::state::Mint::unpack(&account.data).map_err(|e| {
            BuildError::AssetResolution {
                mint: *mint,
                reason: e.to_string(),
            }
        })?;
        Ok((state.decimals, spl_token::id()))
    } else if account.owner == spl_token_2022::id() {
        let state = spl_token_2022::state::Mint::unpack(&account.data).map_err(|e| {
            BuildError::AssetResolution {
                mint: *mint,
                reason: e.to_string(),
            }
        })?;
        Ok((state.decimals, spl_token_2022::id()))
    } else {
        Err(BuildError::AssetResolution {
            mint: *mint,
            reason: "unknown mint owner".to_owned(),
        })
    }
}

async fn holding_account_missing<N: NetworkQuery + ?Sized>(
    network: &N,
    ata: &Pubkey,
) -> Result<bool, BuildError> {
    let account = network
        .get_account(ata)
        .await
        .map_err(|e| BuildError::NetworkUnavailable(e.to_string()))?;
    Ok(account.is_none())
}

/// Direct lamport transfer.
fn system_transfer_instruction(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    // SystemInstruction::Transfer layout: u32 LE tag 2, then u64 LE lamports.
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_PUBKEY,
        accounts: vec![
            AccountMeta::new(*from, true),
            AccountMeta::new(*to, false),
        ],
        data,
    }
}

/// Payer-funded idempotent holding-account creation.
fn create_holding_account_instruction(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    let ata = associated_token_account(owner, mint, token_program);
    Instruction {
        program_id: ATA_PROGRAM_PUBKEY,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_PUBKEY, false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        // CreateIdempotent discriminator byte is 1
        data: vec![1],
    }
}

/// `transfer_checked` for whichever token program owns the mint.
fn token_transfer_instruction(
    token_program: &Pubkey,
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction, BuildError> {
    let instruction = if *token_program == spl_token_2022::id() {
        spl_token_2022::instruction::transfer_checked(
            token_program,
            source,
            mint,
            destination,
            authority,
            &[],
            amount,
            decimals,
        )
    } else {
        spl_token::instruction::transfer_checked(
            token_program,
            source,
            mint,
            destination,
            authority,
            &[],
            amount,
            decimals,
        )
    };
    instruction.map_err(|e| BuildError::Compile(e.to_string()))
}

/// Converts a display-unit amount to base units, truncating nothing: the
/// input is expected to be pre-rounded to the asset's precision.
fn to_base_units(amount: Decimal, decimals: u32) -> Option<u64> {
    let scale = 10u64.checked_pow(decimals)?;
    (amount * Decimal::from(scale)).trunc().to_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{QueryError, ReferenceSighting, TransferExpectation};
    use async_trait::async_trait;
    use solana_account::Account;
    use solana_message::Hash;
    use spl_token::solana_program::program_option::COption;
    use std::collections::HashMap;
    use std::str::FromStr;

    struct MockNetwork {
        accounts: HashMap<Pubkey, Account>,
        blockhash_fails: bool,
    }

    impl MockNetwork {
        fn empty() -> Self {
            Self {
                accounts: HashMap::new(),
                blockhash_fails: false,
            }
        }

        fn with_mint(mint: Pubkey, decimals: u8) -> Self {
            let state = spl_token::state::Mint {
                mint_authority: COption::None,
                supply: 0,
                decimals,
                is_initialized: true,
                freeze_authority: COption::None,
            };
            let mut data = vec![0u8; spl_token::state::Mint::LEN];
            state.pack_into_slice(&mut data);
            let account = Account {
                lamports: 1,
                data,
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            };
            let mut accounts = HashMap::new();
            accounts.insert(mint, account);
            Self {
                accounts,
                blockhash_fails: false,
            }
        }

        fn add_account(&mut self, address: Pubkey) {
            self.accounts.insert(
                address,
                Account {
                    lamports: 1,
                    data: vec![],
                    owner: spl_token::id(),
                    executable: false,
                    rent_epoch: 0,
                },
            );
        }
    }

    #[async_trait]
    impl NetworkQuery for MockNetwork {
        async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, QueryError> {
            Ok(self.accounts.get(address).cloned())
        }

        async fn latest_blockhash(&self) -> Result<Hash, QueryError> {
            if self.blockhash_fails {
                Err(QueryError("connection refused".into()))
            } else {
                Ok(Hash::default())
            }
        }

        async fn find_reference(
            &self,
            _reference: &Pubkey,
        ) -> Result<Option<ReferenceSighting>, QueryError> {
            Ok(None)
        }

        async fn validate_transfer(
            &self,
            _signature: &str,
            _expectation: &TransferExpectation,
        ) -> Result<bool, QueryError> {
            Ok(false)
        }
    }

    fn request<'a>(
        correlation: &'a CorrelationKey,
        asset: AssetKind,
        amount: &str,
        memo: Option<&str>,
    ) -> TransferRequest<'a> {
        TransferRequest {
            payer: Pubkey::new_unique(),
            merchant: Pubkey::new_unique(),
            amount: Decimal::from_str(amount).unwrap(),
            asset,
            correlation,
            memo: memo.map(str::to_owned),
        }
    }

    fn instruction_programs(transaction: &VersionedTransaction) -> Vec<Pubkey> {
        let keys = transaction.message.static_account_keys();
        transaction
            .message
            .instructions()
            .iter()
            .map(|ix| *ix.program_id(keys))
            .collect()
    }

    #[tokio::test]
    async fn native_split_emits_transfer_fee_and_memo_in_order() {
        let network = MockNetwork::empty();
        let treasury = Pubkey::new_unique();
        let fees = FeeConfig::new(Some(treasury), 75);
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Sol, "1.5", Some("demo/sku-1"));
        let payer = req.payer;

        let built = build_transfer(&network, &fees, req).await.unwrap();
        let programs = instruction_programs(&built.transaction);
        assert_eq!(
            programs,
            vec![SYSTEM_PROGRAM_PUBKEY, SYSTEM_PROGRAM_PUBKEY, MEMO_PROGRAM_PUBKEY]
        );

        // 1.5 SOL at 75 bps: 0.01125 fee, 1.48875 to the merchant.
        let keys = built.transaction.message.static_account_keys();
        let instructions = built.transaction.message.instructions();
        assert_eq!(&instructions[0].data[0..4], &2u32.to_le_bytes());
        assert_eq!(&instructions[0].data[4..12], &1_488_750_000u64.to_le_bytes());
        assert_eq!(&instructions[1].data[4..12], &11_250_000u64.to_le_bytes());

        // The correlation key rides on the merchant transfer only.
        let corr_index = keys
            .iter()
            .position(|k| k == correlation.pubkey())
            .expect("correlation key compiled into the message") as u8;
        assert!(instructions[0].accounts.contains(&corr_index));
        assert!(!instructions[1].accounts.contains(&corr_index));

        // Fee payer is the payer and all signature slots are unsigned.
        assert_eq!(keys[0], payer);
        assert!(
            built
                .transaction
                .signatures
                .iter()
                .all(|sig| *sig == Signature::default())
        );
        assert!(!built.transaction.signatures.is_empty());
    }

    #[tokio::test]
    async fn disabled_fees_emit_a_single_transfer() {
        let network = MockNetwork::empty();
        let fees = FeeConfig::disabled();
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Sol, "50", None);

        let built = build_transfer(&network, &fees, req).await.unwrap();
        assert_eq!(built.transaction.message.instructions().len(), 1);
        assert_eq!(built.split.fee, Decimal::ZERO);
        assert_eq!(built.split.merchant, Decimal::from(50));
    }

    #[tokio::test]
    async fn token_transfer_creates_missing_holding_accounts_first() {
        let mint = Pubkey::new_unique();
        let network = MockNetwork::with_mint(mint, 6);
        let treasury = Pubkey::new_unique();
        let fees = FeeConfig::new(Some(treasury), 200);
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Token { mint }, "25", None);

        let built = build_transfer(&network, &fees, req).await.unwrap();
        let programs = instruction_programs(&built.transaction);
        assert_eq!(
            programs,
            vec![
                ATA_PROGRAM_PUBKEY,
                ATA_PROGRAM_PUBKEY,
                spl_token::id(),
                spl_token::id(),
            ]
        );
        let instructions = built.transaction.message.instructions();
        assert_eq!(instructions[0].data, vec![1]);
        assert_eq!(instructions[1].data, vec![1]);
    }

    #[tokio::test]
    async fn token_transfer_skips_creation_for_existing_accounts() {
        let mint = Pubkey::new_unique();
        let mut network = MockNetwork::with_mint(mint, 6);
        let fees = FeeConfig::disabled();
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Token { mint }, "10", None);
        let merchant_ata = associated_token_account(&req.merchant, &mint, &spl_token::id());
        network.add_account(merchant_ata);

        let built = build_transfer(&network, &fees, req).await.unwrap();
        assert_eq!(instruction_programs(&built.transaction), vec![spl_token::id()]);
    }

    #[tokio::test]
    async fn unknown_mint_owner_fails_asset_resolution() {
        let mint = Pubkey::new_unique();
        let mut network = MockNetwork::empty();
        network.accounts.insert(
            mint,
            Account {
                lamports: 1,
                data: vec![0u8; 82],
                owner: Pubkey::new_unique(),
                executable: false,
                rent_epoch: 0,
            },
        );
        let fees = FeeConfig::disabled();
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Token { mint }, "10", None);

        let err = build_transfer(&network, &fees, req).await.unwrap_err();
        assert!(matches!(err, BuildError::AssetResolution { .. }));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let network = MockNetwork::empty();
        let fees = FeeConfig::disabled();
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Sol, "0", None);

        let err = build_transfer(&network, &fees, req).await.unwrap_err();
        assert!(matches!(err, BuildError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn unreachable_network_fails_the_build() {
        let mut network = MockNetwork::empty();
        network.blockhash_fails = true;
        let fees = FeeConfig::disabled();
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Sol, "1", None);

        let err = build_transfer(&network, &fees, req).await.unwrap_err();
        assert!(matches!(err, BuildError::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn base64_encoding_round_trips() {
        let network = MockNetwork::empty();
        let fees = FeeConfig::disabled();
        let correlation = CorrelationKey::generate();
        let req = request(&correlation, AssetKind::Sol, "2", None);

        let built = build_transfer(&network, &fees, req).await.unwrap();
        let encoded = encode_base64(&built.transaction).unwrap();
        let bytes = b64.decode(encoded).unwrap();
        let decoded: VersionedTransaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, built.transaction);
    }
}
