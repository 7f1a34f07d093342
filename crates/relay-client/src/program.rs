//! Bindings for the on-chain relay program: per-network ids, derived
//! addresses, and instruction builders.
//!
//! Account orders and instruction indices are fixed by the deployed
//! program; changing them produces transactions the program rejects.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};

use crate::client::api::{DirectSwapData, SwapData, TransitiveSwapData};
use crate::Result;

/// Cluster the relay program is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayNetwork {
    MainnetBeta,
    Devnet,
    Testnet,
}

pub fn id(network: RelayNetwork) -> Pubkey {
    match network {
        RelayNetwork::MainnetBeta => {
            solana_sdk::pubkey!("12YKFL4mnZz6CBEGePrf293mEzueQM3h8VLPUJsKpGs9")
        }
        RelayNetwork::Devnet | RelayNetwork::Testnet => {
            solana_sdk::pubkey!("6xKJFyuM6UHCT8F5SBxnjGt6ZrZYjsVfnAnAeHPU775k")
        }
    }
}

mod index {
    pub const TOP_UP_WITH_DIRECT_SWAP: u8 = 0;
    pub const TOP_UP_WITH_TRANSITIVE_SWAP: u8 = 1;
    pub const TRANSFER_SOL: u8 = 2;
    pub const CREATE_TRANSIT_TOKEN: u8 = 3;
    pub const TRANSITIVE_SWAP: u8 = 4;
}

/// Relay account funded by the user and spent by the fee payer.
pub fn user_relay_address(user: &Pubkey, network: RelayNetwork) -> Pubkey {
    Pubkey::find_program_address(&[user.as_ref(), b"relay"], &id(network)).0
}

/// Per-user temporary wrapped-SOL account used during top-up swaps.
pub fn user_temporary_wsol_address(user: &Pubkey, network: RelayNetwork) -> Pubkey {
    Pubkey::find_program_address(&[user.as_ref(), b"temporary_wsol"], &id(network)).0
}

/// Transit token account holding the intermediate token of a transitive
/// swap.
pub fn transit_token_account_address(
    user: &Pubkey,
    transit_token_mint: &Pubkey,
    network: RelayNetwork,
) -> Pubkey {
    Pubkey::find_program_address(
        &[user.as_ref(), transit_token_mint.as_ref(), b"transit"],
        &id(network),
    )
    .0
}

/// Top-up instruction: swaps the user's token into the temporary wSOL
/// account and credits the relay account.
pub fn top_up_swap_instruction(
    network: RelayNetwork,
    top_up_swap: &SwapData,
    user_authority: &Pubkey,
    user_source_token_account: &Pubkey,
    fee_payer: &Pubkey,
) -> Result<Instruction> {
    match top_up_swap {
        SwapData::Direct(swap) => top_up_with_direct_swap_instruction(
            network,
            swap,
            user_authority,
            user_source_token_account,
            fee_payer,
        ),
        SwapData::Transitive(swap) => top_up_with_transitive_swap_instruction(
            network,
            swap,
            user_authority,
            user_source_token_account,
            fee_payer,
        ),
    }
}

fn top_up_with_direct_swap_instruction(
    network: RelayNetwork,
    swap: &DirectSwapData,
    user_authority: &Pubkey,
    user_source_token_account: &Pubkey,
    fee_payer: &Pubkey,
) -> Result<Instruction> {
    let user_relay_account = user_relay_address(user_authority, network);
    let user_temporary_wsol_account = user_temporary_wsol_address(user_authority, network);

    let mut data = vec![index::TOP_UP_WITH_DIRECT_SWAP];
    data.extend_from_slice(&swap.amount_in.to_le_bytes());
    data.extend_from_slice(&swap.minimum_amount_out.to_le_bytes());

    Ok(Instruction {
        program_id: id(network),
        accounts: vec![
            AccountMeta::new_readonly(spl_token::native_mint::id(), false),
            AccountMeta::new(*fee_payer, true),
            AccountMeta::new_readonly(*user_authority, true),
            AccountMeta::new(user_relay_account, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(swap.program_id.parse()?, false),
            AccountMeta::new_readonly(swap.account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.authority_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.transfer_authority_pubkey.parse()?, true),
            AccountMeta::new(*user_source_token_account, false),
            AccountMeta::new(user_temporary_wsol_account, false),
            AccountMeta::new(swap.source_pubkey.parse()?, false),
            AccountMeta::new(swap.destination_pubkey.parse()?, false),
            AccountMeta::new(swap.pool_token_mint_pubkey.parse()?, false),
            AccountMeta::new(swap.pool_fee_account_pubkey.parse()?, false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    })
}

fn top_up_with_transitive_swap_instruction(
    network: RelayNetwork,
    swap: &TransitiveSwapData,
    user_authority: &Pubkey,
    user_source_token_account: &Pubkey,
    fee_payer: &Pubkey,
) -> Result<Instruction> {
    let user_relay_account = user_relay_address(user_authority, network);
    let user_temporary_wsol_account = user_temporary_wsol_address(user_authority, network);
    let transit_token_mint: Pubkey = swap.transit_token_mint_pubkey.parse()?;
    let transit_token_account =
        transit_token_account_address(user_authority, &transit_token_mint, network);

    let mut data = vec![index::TOP_UP_WITH_TRANSITIVE_SWAP];
    data.extend_from_slice(&swap.from.amount_in.to_le_bytes());
    data.extend_from_slice(&swap.from.minimum_amount_out.to_le_bytes());
    data.extend_from_slice(&swap.to.minimum_amount_out.to_le_bytes());

    Ok(Instruction {
        program_id: id(network),
        accounts: vec![
            AccountMeta::new_readonly(spl_token::native_mint::id(), false),
            AccountMeta::new(*fee_payer, true),
            AccountMeta::new_readonly(*user_authority, true),
            AccountMeta::new(user_relay_account, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(swap.from.transfer_authority_pubkey.parse()?, true),
            AccountMeta::new(*user_source_token_account, false),
            AccountMeta::new(transit_token_account, false),
            AccountMeta::new(user_temporary_wsol_account, false),
            AccountMeta::new_readonly(swap.from.program_id.parse()?, false),
            AccountMeta::new_readonly(swap.from.account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.from.authority_pubkey.parse()?, false),
            AccountMeta::new(swap.from.source_pubkey.parse()?, false),
            AccountMeta::new(swap.from.destination_pubkey.parse()?, false),
            AccountMeta::new(swap.from.pool_token_mint_pubkey.parse()?, false),
            AccountMeta::new(swap.from.pool_fee_account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.to.program_id.parse()?, false),
            AccountMeta::new_readonly(swap.to.account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.to.authority_pubkey.parse()?, false),
            AccountMeta::new(swap.to.source_pubkey.parse()?, false),
            AccountMeta::new(swap.to.destination_pubkey.parse()?, false),
            AccountMeta::new(swap.to.pool_token_mint_pubkey.parse()?, false),
            AccountMeta::new(swap.to.pool_fee_account_pubkey.parse()?, false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    })
}

/// Repays `lamports` from the user's relay account to `recipient`.
pub fn transfer_sol_instruction(
    user_authority: &Pubkey,
    recipient: &Pubkey,
    lamports: u64,
    network: RelayNetwork,
) -> Instruction {
    let mut data = vec![index::TRANSFER_SOL];
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction {
        program_id: id(network),
        accounts: vec![
            AccountMeta::new_readonly(*user_authority, true),
            AccountMeta::new(user_relay_address(user_authority, network), false),
            AccountMeta::new(*recipient, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    }
}

pub fn create_transit_token_account_instruction(
    fee_payer: &Pubkey,
    user_authority: &Pubkey,
    transit_token_account: &Pubkey,
    transit_token_mint: &Pubkey,
    network: RelayNetwork,
) -> Instruction {
    Instruction {
        program_id: id(network),
        accounts: vec![
            AccountMeta::new(*transit_token_account, false),
            AccountMeta::new_readonly(*transit_token_mint, false),
            AccountMeta::new(*user_authority, true),
            AccountMeta::new_readonly(*fee_payer, true),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: vec![index::CREATE_TRANSIT_TOKEN],
    }
}

/// Two-hop swap routed through the relay program's transit account.
pub fn transitive_swap_instruction(
    swap: &TransitiveSwapData,
    user_source_token_account: &Pubkey,
    transit_token_account: &Pubkey,
    user_destination_token_account: &Pubkey,
    fee_payer: &Pubkey,
    network: RelayNetwork,
) -> Result<Instruction> {
    let mut data = vec![index::TRANSITIVE_SWAP];
    data.extend_from_slice(&swap.from.amount_in.to_le_bytes());
    data.extend_from_slice(&swap.from.minimum_amount_out.to_le_bytes());
    data.extend_from_slice(&swap.to.minimum_amount_out.to_le_bytes());

    Ok(Instruction {
        program_id: id(network),
        accounts: vec![
            AccountMeta::new(*fee_payer, true),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(swap.from.transfer_authority_pubkey.parse()?, true),
            AccountMeta::new(*user_source_token_account, false),
            AccountMeta::new(*transit_token_account, false),
            AccountMeta::new(*user_destination_token_account, false),
            AccountMeta::new_readonly(swap.from.program_id.parse()?, false),
            AccountMeta::new_readonly(swap.from.account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.from.authority_pubkey.parse()?, false),
            AccountMeta::new(swap.from.source_pubkey.parse()?, false),
            AccountMeta::new(swap.from.destination_pubkey.parse()?, false),
            AccountMeta::new(swap.from.pool_token_mint_pubkey.parse()?, false),
            AccountMeta::new(swap.from.pool_fee_account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.to.program_id.parse()?, false),
            AccountMeta::new_readonly(swap.to.account_pubkey.parse()?, false),
            AccountMeta::new_readonly(swap.to.authority_pubkey.parse()?, false),
            AccountMeta::new(swap.to.source_pubkey.parse()?, false),
            AccountMeta::new(swap.to.destination_pubkey.parse()?, false),
            AccountMeta::new(swap.to.pool_token_mint_pubkey.parse()?, false),
            AccountMeta::new(swap.to.pool_fee_account_pubkey.parse()?, false),
        ],
        data,
    })
}
