//! Bindings of the multisig token contract.

#![allow(missing_docs)]

use ethers::contract::abigen;

abigen!(
    TftContract,
    r#"[
        struct Signature { uint8 v; bytes32 r; bytes32 s; }
        function isMintID(string txid) external view returns (bool)
        function getSignaturesRequired() external view returns (uint256)
        function getSigners() external view returns (address[])
        function mintTokens(address receiver, uint256 tokens, string txid, Signature[] signatures) external
        event Withdraw(address indexed receiver, uint256 tokens, string blockchain_address, string network)
    ]"#
);
