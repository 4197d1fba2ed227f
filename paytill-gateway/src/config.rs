//! Gateway configuration.
//!
//! Loaded from a TOML file with `$VAR` / `${VAR}` environment expansion in
//! string values, so secrets (the webhook shared secret, a private RPC URL)
//! stay out of the file itself.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4650
//! rpc_url = "https://api.devnet.solana.com"
//! treasury = "J6yPiuLBPgEwTLSYmMcUZfbDTyMLTJ4xRNyZtz2rNof9"
//! fee_bps = 75
//! webhook_secret = "$WEBHOOK_SECRET"
//!
//! [tokens]
//! usdc = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"
//!
//! [[storefronts]]
//! slug = "demo"
//! label = "Demo Store"
//! wallet = "7Vp2cDAs3Ga4jRcDDFHsKrLJNqYtTRWcDGoCBazM95g1"
//!
//! [[storefronts.products]]
//! id = "sku-1"
//! name = "Sticker pack"
//! price = "1.5"
//! asset = "sol"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to the configuration file (default: `config.toml`)
//! - `HOST` / `PORT` — Override the bind address
//! - Any `$VAR` referenced by a string value in the file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;

use paytill::fees::FeeConfig;
use paytill::intent::AssetKind;

use crate::directory::{MemoryDirectory, Product, Storefront};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4650`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Solana JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Platform treasury account (base58). Absent disables fee routing.
    #[serde(default)]
    pub treasury: Option<String>,

    /// Platform fee in basis points. Zero disables fee routing.
    #[serde(default)]
    pub fee_bps: u16,

    /// Shared secret for webhook signature verification. Absent skips
    /// verification (development mode).
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Tokenized assets accepted at checkout, keyed by lowercase symbol.
    #[serde(default)]
    pub tokens: HashMap<String, String>,

    /// Storefronts served by the in-process directory.
    #[serde(default)]
    pub storefronts: Vec<StorefrontConfig>,
}

/// A storefront record in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    /// URL slug identifying the storefront.
    pub slug: String,
    /// Display label shown by wallets.
    pub label: String,
    /// Display icon URL.
    #[serde(default)]
    pub icon: Option<String>,
    /// The merchant's receiving account (base58).
    pub wallet: String,
    /// Products offered by the storefront.
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

/// A product record in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Product reference within the storefront.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Listed price in the settlement asset's display unit.
    pub price: Decimal,
    /// Settlement asset: `"sol"` or a symbol from `[tokens]`.
    #[serde(default = "default_asset")]
    pub asset: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4650
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_owned()
}

fn default_asset() -> String {
    "sol".to_owned()
}

/// A configuration value failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("can not read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("can not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// An address field is not valid base58.
    #[error("invalid address in config field {field}: {value}")]
    InvalidAddress {
        /// Which field failed.
        field: String,
        /// The offending value.
        value: String,
    },
    /// A product references an asset symbol missing from `[tokens]`.
    #[error("unknown asset symbol in config: {0}")]
    UnknownAsset(String),
}

impl GatewayConfig {
    /// Loads configuration from the path in the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let mut config: Self = toml::from_str(&expand_env_vars(&content))?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }

    /// Resolves the fee routing configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for an unparsable treasury.
    pub fn fee_config(&self) -> Result<FeeConfig, ConfigError> {
        let treasury = match &self.treasury {
            Some(raw) if !raw.trim().is_empty() => Some(
                Pubkey::from_str(raw.trim()).map_err(|_| ConfigError::InvalidAddress {
                    field: "treasury".to_owned(),
                    value: raw.clone(),
                })?,
            ),
            _ => None,
        };
        Ok(FeeConfig::new(treasury, self.fee_bps))
    }

    /// Resolves the token registry to mint addresses.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for an unparsable mint.
    pub fn token_registry(&self) -> Result<HashMap<String, Pubkey>, ConfigError> {
        self.tokens
            .iter()
            .map(|(symbol, mint)| {
                let mint = Pubkey::from_str(mint).map_err(|_| ConfigError::InvalidAddress {
                    field: format!("tokens.{symbol}"),
                    value: mint.clone(),
                })?;
                Ok((symbol.to_lowercase(), mint))
            })
            .collect()
    }

    /// Builds the in-process storefront directory from the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparsable wallets or unknown asset
    /// symbols.
    pub fn directory(&self) -> Result<MemoryDirectory, ConfigError> {
        let tokens = self.token_registry()?;
        let directory = MemoryDirectory::new();
        for store in &self.storefronts {
            let wallet =
                Pubkey::from_str(&store.wallet).map_err(|_| ConfigError::InvalidAddress {
                    field: format!("storefronts.{}.wallet", store.slug),
                    value: store.wallet.clone(),
                })?;
            let products = store
                .products
                .iter()
                .map(|p| {
                    let asset = if p.asset.eq_ignore_ascii_case("sol") {
                        AssetKind::Sol
                    } else {
                        let mint = tokens
                            .get(&p.asset.to_lowercase())
                            .ok_or_else(|| ConfigError::UnknownAsset(p.asset.clone()))?;
                        AssetKind::Token { mint: *mint }
                    };
                    Ok(Product {
                        id: p.id.clone(),
                        name: p.name.clone(),
                        price: p.price,
                        asset,
                    })
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            directory.insert(Storefront {
                slug: store.slug.clone(),
                label: store.label.clone(),
                icon: store.icon.clone(),
                wallet,
                products,
            });
        }
        Ok(directory)
    }
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
///
/// Unresolved references are left untouched.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        let (name, tail) = if let Some(stripped) = rest.strip_prefix('{') {
            match stripped.find('}') {
                Some(end) => (&stripped[..end], &stripped[end + 1..]),
                None => {
                    out.push('$');
                    break;
                }
            }
        } else {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        };

        if name.is_empty() {
            out.push('$');
            continue;
        }
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                // Keep the reference verbatim so startup checks can flag it.
                out.push('$');
                if rest.starts_with('{') {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                } else {
                    out.push_str(name);
                }
            }
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}
