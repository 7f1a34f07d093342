//! Assembles relayed swap transactions: source wrapping, destination
//! handling, direct or transitive swap instructions, and fee payback.

use std::sync::Arc;

use solana_sdk::{
    hash::Hash, instruction::Instruction, program_pack::Pack, pubkey::Pubkey,
    signature::Keypair, signer::Signer, system_instruction, transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};

use crate::client::api::SwapData;
use crate::client::orca::{PoolsPair, SwapRouting};
use crate::models::{FeeAmount, PreparedTransaction, TokenAccount};
use crate::program::{self, RelayNetwork};
use crate::relay::context::RelayContext;
use crate::relay::destination::{DestinationAnalysis, DestinationAnalyzer};
use crate::relay::swap_data::prepare_swap_data;
use crate::relay::transit::TransitTokenAccountManager;
use crate::{Error, Result};

pub struct SwapTransactionBuilder {
    destination_analyzer: Arc<dyn DestinationAnalyzer>,
    transit_manager: Arc<dyn TransitTokenAccountManager>,
    routes: Arc<dyn SwapRouting>,
    network: RelayNetwork,
}

/// Working state threaded through the assembly steps.
#[derive(Default)]
pub(crate) struct SwapTransactionOutput {
    user_source_token_account_address: Option<Pubkey>,
    source_wsol_new_account: Option<Keypair>,
    destination_new_account: Option<Keypair>,
    user_destination_token_account_address: Option<Pubkey>,
    instructions: Vec<Instruction>,
    additional_transaction: Option<PreparedTransaction>,
    account_creation_fee: u64,
    additional_payback_fee: u64,
}

impl SwapTransactionBuilder {
    pub fn new(
        destination_analyzer: Arc<dyn DestinationAnalyzer>,
        transit_manager: Arc<dyn TransitTokenAccountManager>,
        routes: Arc<dyn SwapRouting>,
        network: RelayNetwork,
    ) -> Self {
        Self {
            destination_analyzer,
            transit_manager,
            routes,
            network,
        }
    }

    /// Build the relayed swap transaction set.
    ///
    /// Returns the prepared transactions in submission order (at most two:
    /// an account-creation transaction when a native SOL source also needs
    /// a fresh destination, then the swap itself) plus the extra fee the
    /// user owes back for rents the fee payer fronted outside the fee
    /// accounting.
    #[allow(clippy::too_many_arguments)]
    pub async fn build_swap_transaction(
        &self,
        context: &RelayContext,
        owner: &Keypair,
        source_token: &TokenAccount,
        destination_token_mint: Pubkey,
        destination_address: Option<Pubkey>,
        pools: &PoolsPair,
        input_amount: u64,
        slippage: f64,
        blockhash: Hash,
    ) -> Result<(Vec<PreparedTransaction>, u64)> {
        let mut output = SwapTransactionOutput::default();

        self.check_source(context, owner, source_token, input_amount, &mut output)?;
        self.check_destination(
            context,
            owner,
            destination_token_mint,
            destination_address,
            blockhash,
            &mut output,
        )
        .await?;
        self.check_swap_data(context, owner, pools, input_amount, slippage, &mut output)
            .await?;

        // unwrap temporary wSOL accounts back into the owner's balance
        if let Some(source_wsol) = &output.source_wsol_new_account {
            output.instructions.push(spl_token::instruction::close_account(
                &spl_token::id(),
                &source_wsol.pubkey(),
                &owner.pubkey(),
                &owner.pubkey(),
                &[],
            )?);
        }
        if let Some(destination) = &output.destination_new_account {
            output.instructions.push(spl_token::instruction::close_account(
                &spl_token::id(),
                &destination.pubkey(),
                &owner.pubkey(),
                &owner.pubkey(),
                &[],
            )?);
        }

        // fee payer + owner + every fresh account keypair
        let mut signatures: u64 = 2;
        if output.source_wsol_new_account.is_some() {
            signatures += 1;
        }
        if output.destination_new_account.is_some() {
            signatures += 1;
        }

        let mut transaction_fee = signatures * context.lamports_per_signature;
        if context
            .usage_status
            .is_free_transaction_fee_available(transaction_fee)
        {
            transaction_fee = 0;
        }

        let expected_fee = FeeAmount::new(transaction_fee, output.account_creation_fee);

        // repay fee and fronted rents from the relay account
        let payback = expected_fee.total() + output.additional_payback_fee;
        if payback > 0 {
            output.instructions.push(program::transfer_sol_instruction(
                &owner.pubkey(),
                &context.fee_payer_address,
                payback,
                self.network,
            ));
        }

        let mut transaction =
            Transaction::new_with_payer(&output.instructions, Some(&context.fee_payer_address));

        let mut signers = vec![owner.insecure_clone()];
        if let Some(source_wsol) = output.source_wsol_new_account.take() {
            signers.push(source_wsol);
        }
        if let Some(destination) = output.destination_new_account.take() {
            signers.push(destination);
        }
        {
            let signer_refs: Vec<&Keypair> = signers.iter().collect();
            transaction.try_partial_sign(&signer_refs, blockhash)?;
        }

        let mut transactions = Vec::new();
        if let Some(additional) = output.additional_transaction.take() {
            transactions.push(additional);
        }
        transactions.push(PreparedTransaction::new(transaction, signers, expected_fee));

        Ok((transactions, output.additional_payback_fee))
    }

    /// A native SOL source is wrapped into a fresh temporary wSOL account
    /// funded by the fee payer; the rent is owed back.
    fn check_source(
        &self,
        context: &RelayContext,
        owner: &Keypair,
        source_token: &TokenAccount,
        input_amount: u64,
        output: &mut SwapTransactionOutput,
    ) -> Result<()> {
        if source_token.mint != spl_token::native_mint::id() {
            output.user_source_token_account_address = Some(source_token.address);
            return Ok(());
        }

        let new_account = Keypair::new();
        output.instructions.extend([
            system_instruction::transfer(
                &owner.pubkey(),
                &context.fee_payer_address,
                input_amount,
            ),
            system_instruction::create_account(
                &context.fee_payer_address,
                &new_account.pubkey(),
                context.minimum_token_account_balance + input_amount,
                spl_token::state::Account::LEN as u64,
                &spl_token::id(),
            ),
            spl_token::instruction::initialize_account(
                &spl_token::id(),
                &new_account.pubkey(),
                &spl_token::native_mint::id(),
                &owner.pubkey(),
            )?,
        ]);

        output.user_source_token_account_address = Some(new_account.pubkey());
        output.source_wsol_new_account = Some(new_account);
        output.additional_payback_fee += context.minimum_token_account_balance;

        Ok(())
    }

    /// Classify the destination and emit whatever account setup it needs.
    pub(crate) async fn check_destination(
        &self,
        context: &RelayContext,
        owner: &Keypair,
        destination_mint: Pubkey,
        destination_address: Option<Pubkey>,
        blockhash: Hash,
        output: &mut SwapTransactionOutput,
    ) -> Result<()> {
        let analysis = self
            .destination_analyzer
            .analyze_destination(owner.pubkey(), destination_mint)
            .await?;

        match analysis {
            DestinationAnalysis::WsolAccount => {
                // receiving native SOL goes through a fresh temporary
                // account that is closed back into the owner's balance
                let new_account = Keypair::new();
                output.instructions.push(system_instruction::create_account(
                    &context.fee_payer_address,
                    &new_account.pubkey(),
                    context.minimum_token_account_balance,
                    spl_token::state::Account::LEN as u64,
                    &spl_token::id(),
                ));
                output.instructions.push(spl_token::instruction::initialize_account(
                    &spl_token::id(),
                    &new_account.pubkey(),
                    &spl_token::native_mint::id(),
                    &owner.pubkey(),
                )?);
                output.account_creation_fee += context.minimum_token_account_balance;
                output.user_destination_token_account_address = Some(new_account.pubkey());
                output.destination_new_account = Some(new_account);
            }
            DestinationAnalysis::SplAccount {
                needs_creation: false,
            } => {
                let address = destination_address.unwrap_or_else(|| {
                    get_associated_token_address(&owner.pubkey(), &destination_mint)
                });
                output.user_destination_token_account_address = Some(address);
            }
            DestinationAnalysis::SplAccount {
                needs_creation: true,
            } => {
                let associated_address =
                    get_associated_token_address(&owner.pubkey(), &destination_mint);
                let create_instruction = create_associated_token_account(
                    &context.fee_payer_address,
                    &owner.pubkey(),
                    &destination_mint,
                    &spl_token::id(),
                );

                if output.source_wsol_new_account.is_some() {
                    // a wrapped source already fills the transaction;
                    // account creation moves into its own transaction
                    let mut transaction = Transaction::new_with_payer(
                        &[create_instruction],
                        Some(&context.fee_payer_address),
                    );
                    transaction.try_partial_sign(&[owner], blockhash)?;
                    output.additional_transaction = Some(PreparedTransaction::new(
                        transaction,
                        vec![owner.insecure_clone()],
                        FeeAmount::new(
                            2 * context.lamports_per_signature,
                            context.minimum_token_account_balance,
                        ),
                    ));
                } else {
                    output.instructions.push(create_instruction);
                    output.account_creation_fee += context.minimum_token_account_balance;
                }

                output.user_destination_token_account_address = Some(associated_address);
            }
        }

        Ok(())
    }

    /// Emit the swap instructions for the chosen route.
    async fn check_swap_data(
        &self,
        context: &RelayContext,
        owner: &Keypair,
        pools: &PoolsPair,
        input_amount: u64,
        slippage: f64,
        output: &mut SwapTransactionOutput,
    ) -> Result<()> {
        let transit_token = self.transit_manager.get_transit_token(pools)?;
        let needs_create_transit = self
            .transit_manager
            .needs_create_transit_token_account(transit_token)
            .await?;

        let (swap_data, _) = prepare_swap_data(
            self.routes.as_ref(),
            &owner.pubkey(),
            pools,
            Some(input_amount),
            None,
            slippage,
            transit_token.map(|token| token.mint),
            needs_create_transit == Some(true),
            false,
        )?;

        let user_source = output
            .user_source_token_account_address
            .ok_or(Error::Unknown)?;
        let user_destination = output
            .user_destination_token_account_address
            .ok_or(Error::Unknown)?;

        match &swap_data {
            SwapData::Direct(direct) => {
                output.instructions.push(self.routes.swap_instruction(
                    &pools[0],
                    owner.pubkey(),
                    user_source,
                    user_destination,
                    direct.amount_in,
                    direct.minimum_amount_out,
                )?);
            }
            SwapData::Transitive(transitive) => {
                let transit_token = transit_token.ok_or(Error::TransitTokenMintNotFound)?;

                if needs_create_transit == Some(true) {
                    output.instructions.push(
                        program::create_transit_token_account_instruction(
                            &context.fee_payer_address,
                            &owner.pubkey(),
                            &transit_token.address,
                            &transit_token.mint,
                            self.network,
                        ),
                    );
                }

                output.instructions.push(program::transitive_swap_instruction(
                    transitive,
                    &user_source,
                    &transit_token.address,
                    &user_destination,
                    &context.fee_payer_address,
                    self.network,
                )?);
            }
        }

        Ok(())
    }
}
