use alloy::sol;

sol! {
    #![sol(all_derives)]

    event PoolBalanceChanged(
        bytes32 indexed poolId,
        address indexed liquidityProvider,
        address[] tokens,
        int256[] deltas,
        uint256[] protocolFeeAmounts
    );
    event Swap(
        bytes32 indexed poolId,
        address indexed tokenIn,
        address indexed tokenOut,
        uint256 amountIn,
        uint256 amountOut
    );

    #[sol(rpc)]
    interface IVault {
        function getPoolTokenInfo(bytes32 poolId, address token)
            external
            view
            returns (uint256 cash, uint256 managed, uint256 lastChangeBlock, address assetManager);
    }
}
