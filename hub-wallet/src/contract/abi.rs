//! ABI helpers: interface parsing, JSON <-> token conversion, calldata
//! encoding and return decoding.

use ethers::abi::{Abi, Function, ParamType, Token};
use ethers::types::{Address, I256, U256};
use serde_json::Value;

/// Parse a uint from a decimal or 0x-prefixed hex string
pub fn parse_u256(s: &str) -> Result<U256, String> {
    let s = s.trim();
    if s.starts_with("0x") || s.starts_with("0X") {
        U256::from_str_radix(&s[2..], 16).map_err(|e| format!("Invalid hex: {} - {}", s, e))
    } else {
        // from_dec_str, not parse(): parse() reads hex
        U256::from_dec_str(s).map_err(|e| format!("Invalid decimal: {} - {}", s, e))
    }
}

/// Parse a JSON ABI: either a bare array or an artifact object with an `abi` field
pub fn parse_json_abi(source: &str) -> Result<Abi, String> {
    let value: Value = serde_json::from_str(source).map_err(|e| format!("Invalid ABI JSON: {}", e))?;
    let abi = match value {
        Value::Object(mut obj) if obj.contains_key("abi") => obj.remove("abi").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(abi).map_err(|e| format!("Failed to parse ABI: {}", e))
}

/// Parse human-readable signatures, e.g. `function transfer(address,uint256) returns (bool)`
pub fn parse_signatures(signatures: &[&str]) -> Result<Abi, String> {
    ethers::abi::parse_abi(signatures).map_err(|e| format!("Failed to parse signatures: {}", e))
}

/// Pick the overload of `name` that takes exactly `arity` arguments
pub fn select_overload<'a>(abi: &'a Abi, name: &str, arity: usize) -> Result<&'a Function, String> {
    let candidates = abi
        .functions
        .get(name)
        .ok_or_else(|| format!("ABI has no function named '{}'", name))?;

    candidates.iter().find(|f| f.inputs.len() == arity).ok_or_else(|| {
        let shapes: Vec<String> = candidates.iter().map(describe_signature).collect();
        format!(
            "'{}' has no overload taking {} argument(s); candidates are {}",
            name,
            arity,
            shapes.join(" | ")
        )
    })
}

/// `name(type label, ...)`, labels omitted when the ABI has none
fn describe_signature(function: &Function) -> String {
    let inputs: Vec<String> = function
        .inputs
        .iter()
        .map(|input| match input.name.as_str() {
            "" => input.kind.to_string(),
            label => format!("{} {}", input.kind, label),
        })
        .collect();
    format!("{}({})", function.name, inputs.join(", "))
}

/// Integers arrive as JSON numbers or as decimal/hex strings
fn integer_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn unsigned_arg(value: &Value, bits: usize) -> Result<Token, String> {
    let text = integer_text(value).ok_or_else(|| format!("uint{} argument must be numeric, got {}", bits, value))?;
    let n = parse_u256(&text).map_err(|_| format!("'{}' is not a valid uint{}", text, bits))?;
    if n.bits() > bits {
        return Err(format!("{} does not fit in uint{}", text, bits));
    }
    Ok(Token::Uint(n))
}

fn signed_arg(value: &Value, bits: usize) -> Result<Token, String> {
    let text = integer_text(value).ok_or_else(|| format!("int{} argument must be numeric, got {}", bits, value))?;
    let n: I256 = text.parse().map_err(|_| format!("'{}' is not a valid int{}", text, bits))?;
    if (1..256).contains(&bits) {
        // Representable range is [-2^(bits-1), 2^(bits-1))
        let limit = I256::from_raw(U256::one() << (bits - 1));
        if n >= limit || n < -limit {
            return Err(format!("{} does not fit in int{}", text, bits));
        }
    }
    Ok(Token::Int(n.into_raw()))
}

fn decode_hex_arg(value: &Value, kind: &ParamType) -> Result<Vec<u8>, String> {
    let text = value
        .as_str()
        .ok_or_else(|| format!("{} argument must be a hex string, got {}", kind, value))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| format!("'{}' is not valid hex for {}: {}", text, kind, e))
}

/// Elements of an array or tuple argument, checked against an expected length
fn sequence_arg<'v>(value: &'v Value, kind: &ParamType, len: Option<usize>) -> Result<&'v [Value], String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("{} argument must be a JSON array, got {}", kind, value))?;
    match len {
        Some(expected) if items.len() != expected => Err(format!(
            "{} argument needs {} element(s), got {}",
            kind,
            expected,
            items.len()
        )),
        _ => Ok(items),
    }
}

/// Convert one JSON argument into the token for `kind`
pub fn json_to_token(value: &Value, kind: &ParamType) -> Result<Token, String> {
    let token = match kind {
        ParamType::Address => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("address argument must be a string, got {}", value))?;
            Token::Address(text.parse::<Address>().map_err(|_| format!("'{}' is not an address", text))?)
        }
        ParamType::Uint(bits) => unsigned_arg(value, *bits)?,
        ParamType::Int(bits) => signed_arg(value, *bits)?,
        ParamType::Bool => Token::Bool(
            value
                .as_bool()
                .ok_or_else(|| format!("bool argument must be true or false, got {}", value))?,
        ),
        ParamType::String => Token::String(
            value
                .as_str()
                .ok_or_else(|| format!("string argument must be a JSON string, got {}", value))?
                .to_string(),
        ),
        ParamType::Bytes => Token::Bytes(decode_hex_arg(value, kind)?),
        ParamType::FixedBytes(size) => {
            let bytes = decode_hex_arg(value, kind)?;
            if bytes.len() != *size {
                return Err(format!("{} argument needs {} byte(s), got {}", kind, size, bytes.len()));
            }
            Token::FixedBytes(bytes)
        }
        ParamType::Array(element) => Token::Array(
            sequence_arg(value, kind, None)?
                .iter()
                .map(|item| json_to_token(item, element))
                .collect::<Result<_, _>>()?,
        ),
        ParamType::FixedArray(element, size) => Token::FixedArray(
            sequence_arg(value, kind, Some(*size))?
                .iter()
                .map(|item| json_to_token(item, element))
                .collect::<Result<_, _>>()?,
        ),
        ParamType::Tuple(members) => Token::Tuple(
            sequence_arg(value, kind, Some(members.len()))?
                .iter()
                .zip(members)
                .map(|(item, member)| json_to_token(item, member))
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(token)
}

/// Encode calldata for a function call
pub fn encode_call(function: &Function, params: &[Value]) -> Result<Vec<u8>, String> {
    if params.len() != function.inputs.len() {
        return Err(format!(
            "{} takes {} argument(s), got {}",
            describe_signature(function),
            function.inputs.len(),
            params.len()
        ));
    }

    let tokens = params
        .iter()
        .zip(&function.inputs)
        .map(|(value, input)| json_to_token(value, &input.kind).map_err(|e| format!("{}: {}", input.name, e)))
        .collect::<Result<Vec<_>, _>>()?;

    function
        .encode_input(&tokens)
        .map_err(|e| format!("Could not encode {}: {}", function.name, e))
}

/// Render a decoded token as JSON. Integers become decimal strings so
/// 256-bit values survive.
pub fn token_to_json(token: Token) -> Value {
    match token {
        Token::Address(a) => Value::String(format!("{:?}", a)),
        Token::Uint(n) => Value::String(n.to_string()),
        Token::Int(raw) => Value::String(I256::from_raw(raw).to_string()),
        Token::Bool(b) => Value::Bool(b),
        Token::String(s) => Value::String(s),
        Token::Bytes(b) | Token::FixedBytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            items.into_iter().map(token_to_json).collect()
        }
    }
}

/// Decode a call's return data. A single output is unwrapped.
pub fn decode_return(function: &Function, data: &[u8]) -> Result<Value, String> {
    let mut outputs = function
        .decode_output(data)
        .map_err(|e| format!("Could not decode {} output: {}", function.name, e))?;

    match outputs.pop() {
        Some(only) if outputs.is_empty() => Ok(token_to_json(only)),
        last => {
            outputs.extend(last);
            Ok(outputs.into_iter().map(token_to_json).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn erc20() -> Abi {
        parse_signatures(&[
            "function transfer(address to, uint256 amount) returns (bool)",
            "function balanceOf(address owner) view returns (uint256)",
            "function getReserves() view returns (uint112, uint112, uint32)",
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_u256() {
        assert_eq!(parse_u256("331157").unwrap(), U256::from(331157u64));
        assert_eq!(parse_u256("0x10").unwrap(), U256::from(16u64));
        assert!(parse_u256("12abc").is_err());
    }

    #[test]
    fn test_encode_transfer_selector() {
        let abi = erc20();
        let func = select_overload(&abi, "transfer", 2).unwrap();
        let data = encode_call(
            func,
            &[json!("0x0000000000000000000000000000000000000002"), json!(100)],
        )
        .unwrap();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(data[4 + 63], 100);
    }

    #[test]
    fn test_overload_and_arity_errors() {
        let abi = erc20();
        let err = select_overload(&abi, "transfer", 3).unwrap_err();
        assert!(err.contains("transfer(address to, uint256 amount)"));
        assert!(select_overload(&abi, "approve", 2).is_err());

        let func = select_overload(&abi, "transfer", 2).unwrap();
        assert!(encode_call(func, &[json!("0x0000000000000000000000000000000000000002")]).is_err());
    }

    #[test]
    fn test_json_to_token_shapes() {
        assert_eq!(json_to_token(&json!("-5"), &ParamType::Int(256)).unwrap(), Token::Int(I256::from(-5).into_raw()));
        assert!(json_to_token(&json!("0xabcd"), &ParamType::FixedBytes(4)).is_err());
        let tuple = ParamType::Tuple(vec![ParamType::Bool, ParamType::Array(Box::new(ParamType::Uint(8)))]);
        assert_eq!(
            json_to_token(&json!([true, [1, "0x2"]]), &tuple).unwrap(),
            Token::Tuple(vec![
                Token::Bool(true),
                Token::Array(vec![Token::Uint(U256::one()), Token::Uint(U256::from(2u64))])
            ])
        );
    }

    #[test]
    fn test_integer_width_is_enforced() {
        assert_eq!(json_to_token(&json!(255), &ParamType::Uint(8)).unwrap(), Token::Uint(U256::from(255u64)));
        let err = json_to_token(&json!(300), &ParamType::Uint(8)).unwrap_err();
        assert!(err.contains("uint8"));
        assert!(json_to_token(&json!("0x10000"), &ParamType::Uint(16)).is_err());

        assert!(json_to_token(&json!(128), &ParamType::Int(8)).is_err());
        assert!(json_to_token(&json!(-129), &ParamType::Int(8)).is_err());
        assert_eq!(
            json_to_token(&json!(-128), &ParamType::Int(8)).unwrap(),
            Token::Int(I256::from(-128).into_raw())
        );
        assert!(json_to_token(&json!(127), &ParamType::Int(8)).is_ok());

        let abi = parse_signatures(&["function setFee(uint8 fee)"]).unwrap();
        let func = select_overload(&abi, "setFee", 1).unwrap();
        assert!(encode_call(func, &[json!(300)]).is_err());
    }

    #[test]
    fn test_decode_return() {
        let abi = erc20();
        let balance = select_overload(&abi, "balanceOf", 1).unwrap();
        let data = ethers::abi::encode(&[Token::Uint(U256::from(871_043_093u64))]);
        assert_eq!(decode_return(balance, &data).unwrap(), json!("871043093"));

        let reserves = select_overload(&abi, "getReserves", 0).unwrap();
        let data = ethers::abi::encode(&[
            Token::Uint(U256::from(1u64)),
            Token::Uint(U256::from(2u64)),
            Token::Uint(U256::from(3u64)),
        ]);
        assert_eq!(decode_return(reserves, &data).unwrap(), json!(["1", "2", "3"]));
    }

    #[test]
    fn test_parse_json_abi_artifact() {
        let artifact = r#"{
            "contractName": "Token",
            "abi": [{
                "type": "function",
                "name": "totalSupply",
                "inputs": [],
                "outputs": [{ "name": "", "type": "uint256" }],
                "stateMutability": "view"
            }]
        }"#;
        let abi = parse_json_abi(artifact).unwrap();
        assert!(abi.function("totalSupply").is_ok());
        assert!(parse_json_abi("{ nope").is_err());
    }
}
