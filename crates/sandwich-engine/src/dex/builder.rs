//! Calldata das pernas do sandwich.
//!
//! Frontrun compra quantidade exata do contrato alvo com teto de moeda.
//! Backrun vende o que foi comprado de volta para a moeda, sem mínimo
//! de saída.

use ethereum_types::{Address, U256};
use ethers::abi::Token;
use ethers::types::Bytes;
use sandwich_core::{DexKind, Error, Result};

use super::decoder::SwapMethod;

/// Parâmetros comuns às duas pernas
#[derive(Debug, Clone, Copy)]
pub struct LegParams {
    pub kind: DexKind,
    pub recipient: Address,
    pub deadline: U256,
    pub fee_tier: u32,
}

fn encode(method: SwapMethod, args: &[Token]) -> Result<Bytes> {
    method
        .function()?
        .encode_input(args)
        .map(Bytes::from)
        .map_err(|e| Error::DecodeError(format!("failed to encode {}: {e}", method.name())))
}

/// Compra `amount_out` de `target` pagando no máximo `amount_in_max` de `coin`
pub fn frontrun_calldata(
    params: &LegParams,
    coin: Address,
    target: Address,
    amount_out: U256,
    amount_in_max: U256,
) -> Result<(SwapMethod, Bytes)> {
    match params.kind {
        DexKind::UniswapV2 => {
            let method = SwapMethod::SwapTokensForExactTokens;
            let data = encode(
                method,
                &[
                    Token::Uint(amount_out),
                    Token::Uint(amount_in_max),
                    Token::Array(vec![Token::Address(coin), Token::Address(target)]),
                    Token::Address(params.recipient),
                    Token::Uint(params.deadline),
                ],
            )?;
            Ok((method, data))
        }
        // Algebra ignora o tier, mas a struct mantém o campo
        DexKind::UniswapV3 | DexKind::QuickswapV3 => {
            let method = SwapMethod::ExactOutputSingle;
            let data = encode(
                method,
                &[Token::Tuple(vec![
                    Token::Address(coin),
                    Token::Address(target),
                    Token::Uint(U256::from(params.fee_tier)),
                    Token::Address(params.recipient),
                    Token::Uint(params.deadline),
                    Token::Uint(amount_out),
                    Token::Uint(amount_in_max),
                    Token::Uint(U256::zero()),
                ])],
            )?;
            Ok((method, data))
        }
    }
}

/// Vende `amount_in` de `target` por `coin` com saída mínima zero
pub fn backrun_calldata(
    params: &LegParams,
    target: Address,
    coin: Address,
    amount_in: U256,
) -> Result<(SwapMethod, Bytes)> {
    let (method, args) = match params.kind {
        DexKind::UniswapV2 => (
            SwapMethod::SwapExactTokensForTokens,
            vec![
                Token::Uint(amount_in),
                Token::Uint(U256::zero()),
                Token::Array(vec![Token::Address(target), Token::Address(coin)]),
                Token::Address(params.recipient),
                Token::Uint(params.deadline),
            ],
        ),
        DexKind::UniswapV3 => (
            SwapMethod::ExactInputSingle,
            vec![Token::Tuple(vec![
                Token::Address(target),
                Token::Address(coin),
                Token::Uint(U256::from(params.fee_tier)),
                Token::Address(params.recipient),
                Token::Uint(params.deadline),
                Token::Uint(amount_in),
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
            ])],
        ),
        DexKind::QuickswapV3 => (
            SwapMethod::AlgebraExactInputSingle,
            vec![Token::Tuple(vec![
                Token::Address(target),
                Token::Address(coin),
                Token::Address(params.recipient),
                Token::Uint(params.deadline),
                Token::Uint(amount_in),
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
            ])],
        ),
    };
    Ok((method, encode(method, &args)?))
}
