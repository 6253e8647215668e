//! Heuristic swap-quote enrichment
//!
//! Best-effort reconstruction of a [`SwapQuote`] from free-form agent text.
//! Each field has an ordered list of patterns (first match wins) and a fixed
//! fallback. Nothing in here returns an error: a miss is `None`, and the
//! turn keeps its raw text either way.

use crate::types::{Network, QuoteLeg, SwapOperation, SwapQuote};
use regex::Regex;
use std::sync::OnceLock;

/// Fee used when the text names none: 0.30% in hundredths of a basis point
pub const DEFAULT_FEE: u32 = 3_000;

/// Token id reported for symbols we do not recognize
pub const UNKNOWN_TOKEN_ID: &str = "unknown";

const AMOUNT: &str = r"(\d[\d,]*(?:\.\d+)?|\.\d+)";
const SYMBOL: &str = r"([A-Za-z][A-Za-z0-9]*)";

/// Phrases that suggest a reply describes a swap
fn markers() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)\b(?:you pay|you (?:will )?receive|swap quote|exchange rate|amounts out|amounts in)\b"
                .to_string(),
        ])
    })
}

fn compile(raw: &[String]) -> Vec<Regex> {
    raw.iter().filter_map(|pattern| Regex::new(pattern).ok()).collect()
}

/// Patterns capturing (amount, symbol) for what the user gives up
fn input_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            format!(r"(?i)\byou pay:?\s*(?:~|≈|about\s+)?{AMOUNT}\s*{SYMBOL}"),
            format!(r"(?i)\b(?:swap|swapping|sell|selling)\s+{AMOUNT}\s*{SYMBOL}"),
            format!(r"(?i)\binput:?\s*{AMOUNT}\s*{SYMBOL}"),
        ])
    })
}

/// Patterns capturing (amount, symbol) for what the user gets
fn output_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            format!(r"(?i)\byou (?:will )?(?:receive|get):?\s*(?:~|≈|about\s+|approximately\s+)?{AMOUNT}\s*{SYMBOL}"),
            format!(r"(?i)\boutput:?\s*{AMOUNT}\s*{SYMBOL}"),
            format!(r"(?i)\b(?:for|into)\s+(?:~|≈|about\s+|approximately\s+)?{AMOUNT}\s*{SYMBOL}"),
        ])
    })
}

/// Patterns whose first group is the rate
fn rate_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            format!(r"(?i)\b1\s*[A-Za-z][A-Za-z0-9]*\s*(?:=|≈|~)\s*{AMOUNT}"),
            format!(r"(?i)\b(?:exchange rate|rate):?\s*{AMOUNT}"),
        ])
    })
}

/// Patterns whose first group is a fee percentage
fn fee_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            format!(r"(?i)\bfees?:?\s*{AMOUNT}\s*%"),
            format!(r"(?i){AMOUNT}\s*%\s*(?:pool\s+)?fee"),
        ])
    })
}

/// Patterns whose first group is an arrow-separated route
fn path_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)\b(?:path|route):?\s*([A-Za-z0-9.]+(?:\s*(?:->|→|>)\s*[A-Za-z0-9.]+)+)".to_string(),
        ])
    })
}

fn gas_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(&[r"(?i)\bgas(?: estimate)?:?\s*(\d[\d,]*)".to_string()]))
}

/// Whether the text carries any swap marker phrase
pub fn looks_like_swap(text: &str) -> bool {
    markers().iter().any(|re| re.is_match(text))
}

/// Known token id for a symbol on a network
pub fn token_id(symbol: &str, network: Network) -> &'static str {
    match (symbol.to_ascii_uppercase().as_str(), network) {
        ("HBAR", _) => "0.0.0",
        ("SAUCE", Network::Mainnet) => "0.0.731861",
        ("SAUCE", Network::Testnet) => "0.0.1183558",
        ("USDC", Network::Mainnet) => "0.0.456858",
        ("USDC", Network::Testnet) => "0.0.1418651",
        ("WHBAR", Network::Mainnet) => "0.0.5566986",
        ("WHBAR", Network::Testnet) => "0.0.6499836",
        _ => UNKNOWN_TOKEN_ID,
    }
}

/// Extract a quote, or `None` if the text does not describe a swap
pub fn extract_swap_quote(text: &str, network: Network) -> Option<SwapQuote> {
    if !looks_like_swap(text) {
        return None;
    }

    let input = first_leg(input_patterns(), text, network)?;
    let output = first_leg(output_patterns(), text, network)?;

    let exchange_rate = first_capture(rate_patterns(), text)
        .map(|rate| strip_commas(&rate))
        .or_else(|| implied_rate(&input.amount, &output.amount))
        .unwrap_or_else(|| "0".to_string());

    let fees = first_capture(fee_patterns(), text)
        .and_then(|pct| percent_to_fee(&pct))
        .map(|fee| vec![fee])
        .unwrap_or_else(|| vec![DEFAULT_FEE]);

    let path = first_capture(path_patterns(), text)
        .map(|route| parse_route(&route, network))
        .unwrap_or_else(|| vec![input.token_id.clone(), output.token_id.clone()]);

    let lower = text.to_ascii_lowercase();
    let operation = if lower.contains("amounts in") || lower.contains("exact output") {
        SwapOperation::GetAmountsIn
    } else {
        SwapOperation::GetAmountsOut
    };

    Some(SwapQuote {
        operation,
        network,
        input,
        output,
        path,
        fees,
        exchange_rate,
        gas_estimate: first_capture(gas_patterns(), text).map(|gas| strip_commas(&gas)),
        original_message: text.to_string(),
    })
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn first_leg(patterns: &[Regex], text: &str, network: Network) -> Option<QuoteLeg> {
    let caps = patterns.iter().find_map(|re| re.captures(text))?;
    let formatted = caps.get(1)?.as_str().to_string();
    let token = caps.get(2)?.as_str().to_ascii_uppercase();
    Some(QuoteLeg {
        token_id: token_id(&token, network).to_string(),
        token,
        amount: strip_commas(&formatted),
        formatted,
    })
}

fn strip_commas(value: &str) -> String {
    value.replace(',', "")
}

fn implied_rate(input: &str, output: &str) -> Option<String> {
    let input: f64 = input.parse().ok()?;
    let output: f64 = output.parse().ok()?;
    if input <= 0.0 {
        return None;
    }
    let rate = format!("{:.6}", output / input);
    Some(rate.trim_end_matches('0').trim_end_matches('.').to_string())
}

fn percent_to_fee(pct: &str) -> Option<u32> {
    let pct: f64 = strip_commas(pct).parse().ok()?;
    if !(0.0..=100.0).contains(&pct) {
        return None;
    }
    Some((pct * 10_000.0).round() as u32)
}

fn parse_route(route: &str, network: Network) -> Vec<String> {
    route
        .split(|c| c == '>' || c == '→')
        .map(|hop| hop.trim().trim_end_matches('-').trim().trim_end_matches('.'))
        .filter(|hop| !hop.is_empty())
        .map(|hop| {
            if hop.starts_with("0.0.") {
                hop.to_string()
            } else {
                token_id(hop, network).to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "You pay 10 HBAR, you receive 0.44 SAUCE, rate 1 HBAR = 0.044636 SAUCE";

    #[test]
    fn test_extracts_basic_quote() {
        let quote = extract_swap_quote(SAMPLE, Network::Mainnet).unwrap();

        assert_eq!(quote.input.token, "HBAR");
        assert_eq!(quote.input.amount, "10");
        assert_eq!(quote.input.token_id, "0.0.0");
        assert_eq!(quote.output.token, "SAUCE");
        assert_eq!(quote.output.amount, "0.44");
        assert_eq!(quote.output.token_id, "0.0.731861");
        assert_eq!(quote.exchange_rate, "0.044636");
        assert_eq!(quote.fees, vec![DEFAULT_FEE]);
        assert_eq!(quote.path, vec!["0.0.0", "0.0.731861"]);
        assert_eq!(quote.operation, SwapOperation::GetAmountsOut);
        assert_eq!(quote.original_message, SAMPLE);
        assert!(quote.gas_estimate.is_none());
    }

    #[test]
    fn test_no_markers_no_quote() {
        assert!(extract_swap_quote("Your HBAR balance is 42.5 HBAR", Network::Mainnet).is_none());
        assert!(extract_swap_quote("", Network::Mainnet).is_none());
    }

    #[test]
    fn test_marker_without_amounts_is_no_quote() {
        assert!(extract_swap_quote(
            "The exchange rate is currently unavailable.",
            Network::Mainnet
        )
        .is_none());
    }

    #[test]
    fn test_testnet_token_ids() {
        let quote = extract_swap_quote(SAMPLE, Network::Testnet).unwrap();
        assert_eq!(quote.output.token_id, "0.0.1183558");
        assert_eq!(quote.network, Network::Testnet);
    }

    #[test]
    fn test_alternate_phrasing_and_fields() {
        let text = "Swap quote: swap 1,000 USDC for approximately 12,345.6 HBAR. \
                    Fee: 0.15%. Route: USDC -> WHBAR -> HBAR. Gas estimate: 250,000";
        let quote = extract_swap_quote(text, Network::Mainnet).unwrap();

        assert_eq!(quote.input.amount, "1000");
        assert_eq!(quote.input.formatted, "1,000");
        assert_eq!(quote.input.token, "USDC");
        assert_eq!(quote.output.amount, "12345.6");
        assert_eq!(quote.output.token, "HBAR");
        assert_eq!(quote.fees, vec![1_500]);
        assert_eq!(quote.path, vec!["0.0.456858", "0.0.5566986", "0.0.0"]);
        assert_eq!(quote.gas_estimate.as_deref(), Some("250000"));
        assert_eq!(quote.exchange_rate, "12.3456");
    }

    #[test]
    fn test_unknown_symbol_falls_back() {
        let quote = extract_swap_quote("You pay 5 HBAR and you receive 100 DOGE", Network::Mainnet).unwrap();
        assert_eq!(quote.output.token_id, UNKNOWN_TOKEN_ID);
        assert_eq!(quote.exchange_rate, "20");
    }

    #[test]
    fn test_exact_output_operation() {
        let text = "Amounts in: you pay 3 HBAR, you receive 1 SAUCE (exact output)";
        let quote = extract_swap_quote(text, Network::Mainnet).unwrap();
        assert_eq!(quote.operation, SwapOperation::GetAmountsIn);
    }

    #[test]
    fn test_token_id_case_insensitive() {
        assert_eq!(token_id("sauce", Network::Mainnet), "0.0.731861");
        assert_eq!(token_id("hbar", Network::Testnet), "0.0.0");
        assert_eq!(token_id("XYZ", Network::Testnet), UNKNOWN_TOKEN_ID);
    }

    #[test]
    fn test_percent_to_fee() {
        assert_eq!(percent_to_fee("0.30"), Some(3_000));
        assert_eq!(percent_to_fee("1"), Some(10_000));
        assert_eq!(percent_to_fee("250"), None);
        assert_eq!(percent_to_fee("abc"), None);
    }

    #[test]
    fn test_implied_rate() {
        assert_eq!(implied_rate("10", "0.44").as_deref(), Some("0.044"));
        assert_eq!(implied_rate("0", "1"), None);
    }
}
