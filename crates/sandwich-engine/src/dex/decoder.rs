use ethereum_types::{Address, U256};
use ethers::abi::{AbiParser, Function, HumanReadableParser, Token};
use once_cell::sync::Lazy;
use sandwich_core::{DexKind, Error, Result};
use serde::{Deserialize, Serialize};

use super::path::decode_packed_path;

/// Funções de swap reconhecidas nos routers registrados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapMethod {
    SwapExactTokensForTokens,
    SwapTokensForExactTokens,
    SwapExactETHForTokens,
    SwapTokensForExactETH,
    SwapExactTokensForETH,
    SwapETHForExactTokens,
    SwapExactTokensForTokensSupportingFeeOnTransferTokens,
    SwapExactETHForTokensSupportingFeeOnTransferTokens,
    SwapExactTokensForETHSupportingFeeOnTransferTokens,
    ExactInputSingle,
    AlgebraExactInputSingle,
    ExactOutputSingle,
    ExactInput,
    ExactOutput,
}

pub const ALL_METHODS: [SwapMethod; 14] = [
    SwapMethod::SwapExactTokensForTokens,
    SwapMethod::SwapTokensForExactTokens,
    SwapMethod::SwapExactETHForTokens,
    SwapMethod::SwapTokensForExactETH,
    SwapMethod::SwapExactTokensForETH,
    SwapMethod::SwapETHForExactTokens,
    SwapMethod::SwapExactTokensForTokensSupportingFeeOnTransferTokens,
    SwapMethod::SwapExactETHForTokensSupportingFeeOnTransferTokens,
    SwapMethod::SwapExactTokensForETHSupportingFeeOnTransferTokens,
    SwapMethod::ExactInputSingle,
    SwapMethod::AlgebraExactInputSingle,
    SwapMethod::ExactOutputSingle,
    SwapMethod::ExactInput,
    SwapMethod::ExactOutput,
];

impl SwapMethod {
    pub fn signature(&self) -> &'static str {
        match self {
            SwapMethod::SwapExactTokensForTokens => {
                "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)"
            }
            SwapMethod::SwapTokensForExactTokens => {
                "swapTokensForExactTokens(uint256,uint256,address[],address,uint256)"
            }
            SwapMethod::SwapExactETHForTokens => {
                "swapExactETHForTokens(uint256,address[],address,uint256)"
            }
            SwapMethod::SwapTokensForExactETH => {
                "swapTokensForExactETH(uint256,uint256,address[],address,uint256)"
            }
            SwapMethod::SwapExactTokensForETH => {
                "swapExactTokensForETH(uint256,uint256,address[],address,uint256)"
            }
            SwapMethod::SwapETHForExactTokens => {
                "swapETHForExactTokens(uint256,address[],address,uint256)"
            }
            SwapMethod::SwapExactTokensForTokensSupportingFeeOnTransferTokens => {
                "swapExactTokensForTokensSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)"
            }
            SwapMethod::SwapExactETHForTokensSupportingFeeOnTransferTokens => {
                "swapExactETHForTokensSupportingFeeOnTransferTokens(uint256,address[],address,uint256)"
            }
            SwapMethod::SwapExactTokensForETHSupportingFeeOnTransferTokens => {
                "swapExactTokensForETHSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)"
            }
            SwapMethod::ExactInputSingle => {
                "function exactInputSingle(tuple(address tokenIn, address tokenOut, uint24 fee, address recipient, uint256 deadline, uint256 amountIn, uint256 amountOutMinimum, uint160 sqrtPriceLimitX96))"
            }
            SwapMethod::AlgebraExactInputSingle => {
                "function exactInputSingle(tuple(address tokenIn, address tokenOut, address recipient, uint256 deadline, uint256 amountIn, uint256 amountOutMinimum, uint160 limitSqrtPrice))"
            }
            SwapMethod::ExactOutputSingle => {
                "function exactOutputSingle(tuple(address tokenIn, address tokenOut, uint24 fee, address recipient, uint256 deadline, uint256 amountOut, uint256 amountInMaximum, uint160 sqrtPriceLimitX96))"
            }
            SwapMethod::ExactInput => {
                "function exactInput(tuple(bytes path, address recipient, uint256 deadline, uint256 amountIn, uint256 amountOutMinimum))"
            }
            SwapMethod::ExactOutput => {
                "function exactOutput(tuple(bytes path, address recipient, uint256 deadline, uint256 amountOut, uint256 amountInMaximum))"
            }
        }
    }

    /// Nome do método como aparece no ABI
    pub fn name(&self) -> &'static str {
        let sig = self.signature();
        let sig = sig.strip_prefix("function ").unwrap_or(sig);
        sig.split('(').next().unwrap_or(sig)
    }

    /// Métodos cujo único parâmetro é uma struct
    pub fn takes_struct(&self) -> bool {
        matches!(
            self,
            SwapMethod::ExactInputSingle
                | SwapMethod::AlgebraExactInputSingle
                | SwapMethod::ExactOutputSingle
                | SwapMethod::ExactInput
                | SwapMethod::ExactOutput
        )
    }

    /// Famílias de router que expõem o método
    pub fn supported_by(&self, kind: DexKind) -> bool {
        match self {
            SwapMethod::ExactInputSingle => kind == DexKind::UniswapV3,
            SwapMethod::AlgebraExactInputSingle => kind == DexKind::QuickswapV3,
            SwapMethod::ExactOutputSingle | SwapMethod::ExactInput | SwapMethod::ExactOutput => {
                kind.is_concentrated()
            }
            _ => kind == DexKind::UniswapV2,
        }
    }

    /// Métodos em que a entrada é o valor nativo enviado
    pub fn native_input(&self) -> bool {
        matches!(
            self,
            SwapMethod::SwapExactETHForTokens
                | SwapMethod::SwapETHForExactTokens
                | SwapMethod::SwapExactETHForTokensSupportingFeeOnTransferTokens
        )
    }

    /// Função ABI já interpretada
    pub fn function(&self) -> Result<&'static Function> {
        METHOD_TABLE
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, f)| f)
            .ok_or_else(|| Error::DecodeError(format!("abi for {} unavailable", self.signature())))
    }
}

static METHOD_TABLE: Lazy<Vec<(SwapMethod, Function)>> = Lazy::new(|| {
    let mut parser = AbiParser::default();
    ALL_METHODS
        .iter()
        .filter_map(|m| {
            let parsed = if m.takes_struct() {
                HumanReadableParser::parse_function(m.signature()).ok()
            } else {
                parser.parse_function(m.signature()).ok()
            };
            parsed.map(|f| (*m, f))
        })
        .collect()
});

/// Identifica qual função de swap foi invocada para a família do router
pub fn detect_swap_function(kind: DexKind, data: &[u8]) -> Option<(SwapMethod, &'static Function)> {
    if data.len() < 4 {
        return None;
    }
    let selector = &data[..4];
    METHOD_TABLE
        .iter()
        .find(|(m, f)| m.supported_by(kind) && selector == f.short_signature())
        .map(|(m, f)| (*m, f))
}

/// Limites de valor de um lado da swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AmountBounds {
    pub exact: Option<U256>,
    pub min: Option<U256>,
    pub max: Option<U256>,
}

impl AmountBounds {
    pub fn exact(value: U256) -> Self {
        Self { exact: Some(value), ..Default::default() }
    }

    pub fn min(value: U256) -> Self {
        Self { min: Some(value), ..Default::default() }
    }

    pub fn max(value: U256) -> Self {
        Self { max: Some(value), ..Default::default() }
    }

    /// Valor usado no dimensionamento: exato, senão máximo, senão mínimo
    pub fn best(&self) -> U256 {
        [self.exact, self.max, self.min]
            .into_iter()
            .flatten()
            .find(|v| !v.is_zero())
            .unwrap_or_default()
    }
}

/// Chamada de swap normalizada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub method: SwapMethod,
    pub amount_in: AmountBounds,
    pub amount_out: AmountBounds,
    /// Sempre na ordem tokenIn -> tokenOut
    pub path: Vec<Address>,
    pub fees: Vec<u32>,
    pub recipient: Address,
    pub deadline: Option<U256>,
}

/// Decodifica a calldata de um router.
///
/// `Ok(None)` quando o seletor não pertence à interface do router.
/// `Err(DecodeError)` quando o seletor é conhecido mas a chamada não
/// fornece valores ou path utilizáveis.
pub fn decode_swap(kind: DexKind, data: &[u8], value: U256) -> Result<Option<DecodedSwap>> {
    let Some((method, function)) = detect_swap_function(kind, data) else {
        return Ok(None);
    };
    let tokens = function
        .decode_input(&data[4..])
        .map_err(|e| Error::DecodeError(format!("{}: {e}", method.name())))?;

    let decoded = if kind.is_concentrated() {
        decode_struct_call(kind, method, &tokens)?
    } else {
        decode_flat_call(method, &tokens, value)?
    };

    if decoded.path.len() < 2 {
        return Err(Error::DecodeError(format!("{}: path shorter than two hops", method.name())));
    }
    if decoded.amount_in.best().is_zero() && decoded.amount_out.best().is_zero() {
        return Err(Error::DecodeError(format!("{}: no usable amounts", method.name())));
    }
    Ok(Some(decoded))
}

fn uint(tokens: &[Token], idx: usize) -> Result<U256> {
    tokens
        .get(idx)
        .cloned()
        .and_then(Token::into_uint)
        .ok_or_else(|| Error::DecodeError(format!("expected uint at position {idx}")))
}

fn address(tokens: &[Token], idx: usize) -> Result<Address> {
    tokens
        .get(idx)
        .cloned()
        .and_then(Token::into_address)
        .ok_or_else(|| Error::DecodeError(format!("expected address at position {idx}")))
}

fn addresses(tokens: &[Token], idx: usize) -> Result<Vec<Address>> {
    tokens
        .get(idx)
        .cloned()
        .and_then(Token::into_array)
        .ok_or_else(|| Error::DecodeError(format!("expected address[] at position {idx}")))?
        .into_iter()
        .map(|t| {
            t.into_address()
                .ok_or_else(|| Error::DecodeError("path entry is not an address".to_string()))
        })
        .collect()
}

fn bytes(tokens: &[Token], idx: usize) -> Result<Vec<u8>> {
    tokens
        .get(idx)
        .cloned()
        .and_then(Token::into_bytes)
        .ok_or_else(|| Error::DecodeError(format!("expected bytes at position {idx}")))
}

fn fee(tokens: &[Token], idx: usize) -> Result<u32> {
    Ok(uint(tokens, idx)?.low_u32())
}

/// Routers de produto constante: parâmetros posicionais
fn decode_flat_call(method: SwapMethod, tokens: &[Token], value: U256) -> Result<DecodedSwap> {
    use SwapMethod::*;

    let (amount_in, amount_out, path_idx) = match method {
        SwapExactTokensForTokens
        | SwapExactTokensForETH
        | SwapExactTokensForTokensSupportingFeeOnTransferTokens
        | SwapExactTokensForETHSupportingFeeOnTransferTokens => (
            AmountBounds::exact(uint(tokens, 0)?),
            AmountBounds::min(uint(tokens, 1)?),
            2,
        ),
        SwapTokensForExactTokens | SwapTokensForExactETH => (
            AmountBounds::max(uint(tokens, 1)?),
            AmountBounds::exact(uint(tokens, 0)?),
            2,
        ),
        SwapExactETHForTokens | SwapExactETHForTokensSupportingFeeOnTransferTokens => {
            (AmountBounds::exact(value), AmountBounds::min(uint(tokens, 0)?), 1)
        }
        SwapETHForExactTokens => (AmountBounds::max(value), AmountBounds::exact(uint(tokens, 0)?), 1),
        other => {
            return Err(Error::DecodeError(format!(
                "{} is not a positional swap",
                other.name()
            )))
        }
    };

    Ok(DecodedSwap {
        method,
        amount_in,
        amount_out,
        path: addresses(tokens, path_idx)?,
        fees: Vec::new(),
        recipient: address(tokens, path_idx + 1)?,
        deadline: Some(uint(tokens, path_idx + 2)?),
    })
}

/// Routers de liquidez concentrada: struct única como parâmetro
fn decode_struct_call(kind: DexKind, method: SwapMethod, tokens: &[Token]) -> Result<DecodedSwap> {
    let params = tokens
        .first()
        .cloned()
        .and_then(Token::into_tuple)
        .ok_or_else(|| Error::DecodeError(format!("{}: expected struct parameter", method.name())))?;
    let p = params.as_slice();
    let with_fees = kind == DexKind::UniswapV3;

    let decoded = match method {
        SwapMethod::ExactInputSingle => DecodedSwap {
            method,
            path: vec![address(p, 0)?, address(p, 1)?],
            fees: vec![fee(p, 2)?],
            recipient: address(p, 3)?,
            deadline: Some(uint(p, 4)?),
            amount_in: AmountBounds::exact(uint(p, 5)?),
            amount_out: AmountBounds::min(uint(p, 6)?),
        },
        SwapMethod::AlgebraExactInputSingle => DecodedSwap {
            method,
            path: vec![address(p, 0)?, address(p, 1)?],
            fees: Vec::new(),
            recipient: address(p, 2)?,
            deadline: Some(uint(p, 3)?),
            amount_in: AmountBounds::exact(uint(p, 4)?),
            amount_out: AmountBounds::min(uint(p, 5)?),
        },
        SwapMethod::ExactOutputSingle => DecodedSwap {
            method,
            path: vec![address(p, 0)?, address(p, 1)?],
            fees: if with_fees { vec![fee(p, 2)?] } else { Vec::new() },
            recipient: address(p, 3)?,
            deadline: Some(uint(p, 4)?),
            amount_out: AmountBounds::exact(uint(p, 5)?),
            amount_in: AmountBounds::max(uint(p, 6)?),
        },
        SwapMethod::ExactInput => {
            let (path, fees) = decode_packed_path(&bytes(p, 0)?, with_fees)?;
            DecodedSwap {
                method,
                path,
                fees,
                recipient: address(p, 1)?,
                deadline: Some(uint(p, 2)?),
                amount_in: AmountBounds::exact(uint(p, 3)?),
                amount_out: AmountBounds::min(uint(p, 4)?),
            }
        }
        SwapMethod::ExactOutput => {
            // exactOutput codifica o path de tokenOut para tokenIn
            let (mut path, mut fees) = decode_packed_path(&bytes(p, 0)?, with_fees)?;
            path.reverse();
            fees.reverse();
            DecodedSwap {
                method,
                path,
                fees,
                recipient: address(p, 1)?,
                deadline: Some(uint(p, 2)?),
                amount_out: AmountBounds::exact(uint(p, 3)?),
                amount_in: AmountBounds::max(uint(p, 4)?),
            }
        }
        other => {
            return Err(Error::DecodeError(format!("{} is not a struct swap", other.name())))
        }
    };
    Ok(decoded)
}
