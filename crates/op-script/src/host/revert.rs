use alloy_primitives::Bytes;
use alloy_sol_types::{Revert, SolError};

/// Decodes an `Error(string)` revert payload.
pub fn decode_revert(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data).ok().map(|revert| revert.reason)
}

/// Encodes `message` as an `Error(string)` revert payload.
pub fn encode_revert(message: impl Into<String>) -> Bytes {
    Revert { reason: message.into() }.abi_encode().into()
}

#[cfg(test)]
mod tests {
    use alloy_primitives::hex;

    use super::*;

    #[test]
    fn test_revert_payload() {
        let data = encode_revert("boom");
        assert_eq!(&data[..4], &hex!("08c379a0"));
        assert_eq!(decode_revert(&data).as_deref(), Some("boom"));
        assert_eq!(decode_revert(&hex!("deadbeef")), None);
    }
}
