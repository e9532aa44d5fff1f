// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::contract::abigen;

// Deposit events emitted by the source-chain fiber router
abigen!(
    FiberRouter,
    r#"[
        event Swap(address sourceToken, address targetToken, uint256 sourceChainId, uint256 targetChainId, uint256 sourceAmount, address sourceAddress, address targetAddress, uint256 settledAmount, bytes32 withdrawalData)
        event NonEvmSwap(address sourceToken, string targetToken, uint256 sourceChainId, string targetChainId, uint256 sourceAmount, address sourceAddress, string targetAddress)
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function decimals() external view returns (uint8)
    ]"#
);
