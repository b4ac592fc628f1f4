use alloy::sol;

sol! {
    #![sol(all_derives)]

    event Transfer(address indexed from, address indexed to, uint256 value);

    #[sol(rpc)]
    interface IERC20 {
        function totalSupply() external view returns (uint256);
    }
}
