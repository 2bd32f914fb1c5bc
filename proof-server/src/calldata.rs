//! Verifier calldata formatting
//!
//! snarkjs emits G2 coordinates as `[c0, c1]`, while the Solidity verifier's
//! pairing precompile expects `[c1, c0]`. The swap happens here and only here.

use alloy::primitives::U256;

use crate::circuit::SNARK_SCALAR_FIELD;
use crate::error::PipelineError;
use crate::types::{CallArgumentsView, Groth16Proof};

/// Arguments of `verifyProof` / `submitReport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArguments {
    pub p_a: [U256; 2],
    pub p_b: [[U256; 2]; 2],
    pub p_c: [U256; 2],
    pub pub_signals: Vec<U256>,
}

impl CallArguments {
    /// Public signals as the fixed-size array the contracts take
    pub fn pub_signals_array(&self) -> Result<[U256; 2], PipelineError> {
        self.pub_signals
            .as_slice()
            .try_into()
            .map_err(|_| PipelineError::ProverFailure {
                message: "verifier expects exactly 2 public signals".to_string(),
                diagnostics: format!("got {}", self.pub_signals.len()),
            })
    }

    /// Organization commitment (signal 0)
    pub fn organization_commitment(&self) -> Option<U256> {
        self.pub_signals.first().copied()
    }

    pub fn to_view(&self) -> CallArgumentsView {
        let s = |v: &U256| v.to_string();
        CallArgumentsView {
            p_a: [s(&self.p_a[0]), s(&self.p_a[1])],
            p_b: [
                [s(&self.p_b[0][0]), s(&self.p_b[0][1])],
                [s(&self.p_b[1][0]), s(&self.p_b[1][1])],
            ],
            p_c: [s(&self.p_c[0]), s(&self.p_c[1])],
            pub_signals: self.pub_signals.iter().map(s).collect(),
        }
    }
}

/// Reverse the coefficient order of both Fp2 coordinates of a G2 point.
pub fn swap_fp2_coefficients(point: [[U256; 2]; 2]) -> [[U256; 2]; 2] {
    let [[x0, x1], [y0, y1]] = point;
    [[x1, x0], [y1, y0]]
}

/// Build verifier arguments from a snarkjs proof and its public signals.
pub fn to_call_arguments(
    proof: &Groth16Proof,
    public_signals: &[String],
) -> Result<CallArguments, PipelineError> {
    let p_a = affine(&proof.pi_a, "pi_a")?;
    let p_c = affine(&proof.pi_c, "pi_c")?;

    if proof.pi_b.len() < 2 {
        return Err(malformed("pi_b", proof.pi_b.len()));
    }
    let x = affine(&proof.pi_b[0], "pi_b[0]")?;
    let y = affine(&proof.pi_b[1], "pi_b[1]")?;
    let p_b = swap_fp2_coefficients([x, y]);

    let pub_signals = public_signals
        .iter()
        .map(|s| parse_signal(s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CallArguments {
        p_a,
        p_b,
        p_c,
        pub_signals,
    })
}

/// First two coordinates; the projective `z` is dropped.
fn affine(coords: &[String], name: &str) -> Result<[U256; 2], PipelineError> {
    match coords {
        [x, y, ..] => Ok([parse_field(x, name)?, parse_field(y, name)?]),
        _ => Err(malformed(name, coords.len())),
    }
}

fn parse_field(value: &str, name: &str) -> Result<U256, PipelineError> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|_| PipelineError::ProverFailure {
        message: format!("{name} holds a value that is not a 256-bit integer"),
        diagnostics: format!("{} chars", value.len()),
    })
}

/// A public signal; the verifier rejects anything not below the scalar field order.
fn parse_signal(value: &str) -> Result<U256, PipelineError> {
    let signal = parse_field(value, "publicSignals")?;
    if signal >= SNARK_SCALAR_FIELD {
        return Err(PipelineError::ProverFailure {
            message: "publicSignals holds a value outside the scalar field".to_string(),
            diagnostics: format!("{} bits", signal.bit_len()),
        });
    }
    Ok(signal)
}

fn malformed(name: &str, len: usize) -> PipelineError {
    PipelineError::ProverFailure {
        message: format!("{name} has too few coordinates"),
        diagnostics: format!("{len} entries"),
    }
}
