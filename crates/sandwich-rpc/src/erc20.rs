//! Codificação das chamadas ERC-20 usadas pelo motor.

use ethereum_types::{Address, U256};
use ethers::abi::{AbiParser, Function, Token};
use ethers::types::Bytes;
use sandwich_core::{Error, Result};

pub const BALANCE_OF: &str = "balanceOf(address) view returns (uint256)";
pub const ALLOWANCE: &str = "allowance(address,address) view returns (uint256)";
pub const DECIMALS: &str = "decimals() view returns (uint8)";
pub const APPROVE: &str = "approve(address,uint256) returns (bool)";

fn function(signature: &str) -> Result<Function> {
    AbiParser::default()
        .parse_function(signature)
        .map_err(|e| Error::DecodeError(format!("invalid abi `{signature}`: {e}")))
}

fn encode(signature: &str, args: &[Token]) -> Result<Bytes> {
    let f = function(signature)?;
    f.encode_input(args)
        .map(Bytes::from)
        .map_err(|e| Error::DecodeError(format!("failed to encode {}: {e}", f.name)))
}

pub fn encode_balance_of(owner: Address) -> Result<Bytes> {
    encode(BALANCE_OF, &[Token::Address(owner)])
}

pub fn encode_allowance(owner: Address, spender: Address) -> Result<Bytes> {
    encode(ALLOWANCE, &[Token::Address(owner), Token::Address(spender)])
}

pub fn encode_decimals() -> Result<Bytes> {
    encode(DECIMALS, &[])
}

/// `approve(spender, amount)`
pub fn encode_approve(spender: Address, amount: U256) -> Result<Bytes> {
    encode(APPROVE, &[Token::Address(spender), Token::Uint(amount)])
}

/// Decodifica a primeira saída inteira de uma chamada de leitura
pub fn decode_uint(signature: &str, output: &[u8]) -> Result<U256> {
    let f = function(signature)?;
    let tokens = f
        .decode_output(output)
        .map_err(|e| Error::DecodeError(format!("failed to decode {}: {e}", f.name)))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| Error::DecodeError(format!("{} returned no integer", f.name)))
}
