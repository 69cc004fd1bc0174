//! Centralized Contract Definitions
//!
//! The only on-chain surface the swap engine touches: ERC-20 allowance /
//! approve / balance, the wrapped-native deposit/withdraw pair, and
//! Multicall3 for batched balance reads. Defined with alloy's `sol!` macro,
//! `#[sol(rpc)]` generates instance types usable with any alloy Provider.
//!
//! Created: 2026-10-02

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

// ── Wrapped native (WETH / WPOL / WBNB) ──────────────────────────────

sol! {
    #[sol(rpc)]
    interface IWETH {
        function deposit() external payable;
        function withdraw(uint256 wad) external;
    }
}

// ── Multicall3 ───────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Call3Result[] memory returnData);
        function getEthBalance(address addr) external view returns (uint256 balance);
    }
}
