//! ABI encoding for the `AccessControl` role calls

use accredo_core::WalletAddress;
use sha3::{Digest, Keccak256};

use crate::RoleAction;

/// Role name hashed into the `bytes32` role identifier
pub const ISSUER_ROLE_NAME: &str = "ISSUER_ROLE";

pub const GRANT_ROLE_SIGNATURE: &str = "grantRole(bytes32,address)";
pub const REVOKE_ROLE_SIGNATURE: &str = "revokeRole(bytes32,address)";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the keccak hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `keccak256("ISSUER_ROLE")`
pub fn issuer_role() -> [u8; 32] {
    keccak256(ISSUER_ROLE_NAME.as_bytes())
}

/// Calldata for `grantRole(ISSUER_ROLE, account)` or `revokeRole(...)`:
/// selector followed by two 32-byte words.
pub fn encode_role_call(action: RoleAction, account: &WalletAddress) -> String {
    let signature = match action {
        RoleAction::Grant => GRANT_ROLE_SIGNATURE,
        RoleAction::Revoke => REVOKE_ROLE_SIGNATURE,
    };

    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&issuer_role());
    data.extend_from_slice(&account.to_abi_word());
    format!("0x{}", hex::encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_control_selectors() {
        assert_eq!(hex::encode(selector(GRANT_ROLE_SIGNATURE)), "2f2ff15d");
        assert_eq!(hex::encode(selector(REVOKE_ROLE_SIGNATURE)), "d547741f");
    }

    #[test]
    fn test_calldata_layout() {
        let account: WalletAddress = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let calldata = encode_role_call(RoleAction::Revoke, &account);

        // 0x + selector + role word + address word
        assert_eq!(calldata.len(), 2 + 8 + 64 + 64);
        assert!(calldata.starts_with("0xd547741f"));
        assert_eq!(&calldata[10..74], hex::encode(issuer_role()));
        assert!(calldata.ends_with("00aa"));
        assert_eq!(&calldata[74..98], "0".repeat(24));
    }
}
