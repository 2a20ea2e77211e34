//! Solidity interfaces of the contracts the client talks to.

use alloy_sol_types::{sol, SolCall};
use dutch_types::{Address, Bytes, EncryptedInput, U256};

sol! {
    /// Dutch auction selling a fixed supply of tokens for a confidential payment token.
    interface IDutchAuction {
        function getPrice() external view returns (uint256 price);
        function tokensLeftReveal() external view returns (uint256 tokensLeft);
        function startingPrice() external view returns (uint256 price);
        function discountRate() external view returns (uint256 rate);
        function startAt() external view returns (uint256 timestamp);
        function expiresAt() external view returns (uint256 timestamp);
        function reservePrice() external view returns (uint256 price);
        function amount() external view returns (uint256 supply);
        function auctionStart() external view returns (bool started);
        function seller() external view returns (address account);
        function token() external view returns (address tokenAddress);
        function paymentToken() external view returns (address tokenAddress);

        function bid(bytes32 encryptedValue, bytes calldata inputProof) external returns (bool success);
    }

    /// Plain ERC20.
    interface IERC20 {
        function name() external view returns (string tokenName);
        function symbol() external view returns (string tokenSymbol);
        function decimals() external view returns (uint8 tokenDecimals);
        function totalSupply() external view returns (uint256 supply);
        function balanceOf(address owner) external view returns (uint256 balance);

        function transfer(address to, uint256 value) external returns (bool success);
    }

    /// ERC20 whose balances and amounts are encrypted handles.
    interface IConfidentialERC20 {
        function balanceOf(address owner) external view returns (uint256 handle);

        function transfer(address to, bytes32 encryptedAmount, bytes calldata inputProof) external returns (bool success);
    }
}

/// Calldata for `bid(encryptedValue, inputProof)`.
pub fn encode_bid(input: &EncryptedInput) -> Bytes {
    IDutchAuction::bidCall {
        encryptedValue: input.handle,
        inputProof: input.input_proof.clone(),
    }
    .abi_encode()
    .into()
}

/// Calldata for a plain ERC20 `transfer(to, value)`.
pub fn encode_erc20_transfer(to: Address, value: U256) -> Bytes {
    IERC20::transferCall { to, value }.abi_encode().into()
}

/// Calldata for a confidential `transfer(to, encryptedAmount, inputProof)`.
pub fn encode_confidential_transfer(to: Address, input: &EncryptedInput) -> Bytes {
    IConfidentialERC20::transferCall {
        to,
        encryptedAmount: input.handle,
        inputProof: input.input_proof.clone(),
    }
    .abi_encode()
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutch_types::B256;

    #[test]
    fn test_erc20_transfer_selector() {
        let data = encode_erc20_transfer(Address::repeat_byte(1), U256::from(5));
        // transfer(address,uint256)
        assert_eq!(hex::encode(&data[..4]), "a9059cbb");
        assert_eq!(data.len(), 4 + 32 * 2);
    }

    #[test]
    fn test_confidential_transfer_differs_from_erc20() {
        let input = EncryptedInput {
            handle: B256::repeat_byte(9),
            input_proof: Bytes::from_static(&[1, 2, 3]),
        };
        let data = encode_confidential_transfer(Address::repeat_byte(1), &input);
        assert_ne!(&data[..4], &IERC20::transferCall::SELECTOR[..]);
        assert_eq!(&data[..4], &IConfidentialERC20::transferCall::SELECTOR[..]);
    }

    #[test]
    fn test_bid_calldata_decodes() {
        let input = EncryptedInput {
            handle: B256::repeat_byte(3),
            input_proof: Bytes::from_static(b"proof"),
        };
        let data = encode_bid(&input);
        let decoded = IDutchAuction::bidCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.encryptedValue, input.handle);
        assert_eq!(decoded.inputProof, input.input_proof);
    }
}
