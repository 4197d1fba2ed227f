//! Storefront collaborator contract.
//!
//! Catalog management lives outside this system; the gateway only needs to
//! resolve a slug to a storefront record and a receiving wallet back to its
//! storefronts (the webhook correlation path). [`MemoryDirectory`] is the
//! in-process implementation used by the binary and the tests.

use dashmap::DashMap;
use rust_decimal::Decimal;
use solana_pubkey::Pubkey;

use paytill::intent::AssetKind;

/// A sellable product within a storefront.
#[derive(Debug, Clone)]
pub struct Product {
    /// Product reference within the storefront.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Listed price in the settlement asset's display unit.
    pub price: Decimal,
    /// Settlement asset.
    pub asset: AssetKind,
}

/// A merchant storefront record.
#[derive(Debug, Clone)]
pub struct Storefront {
    /// URL slug identifying the storefront.
    pub slug: String,
    /// Display label shown by wallets.
    pub label: String,
    /// Display icon URL.
    pub icon: Option<String>,
    /// The merchant's receiving account.
    pub wallet: Pubkey,
    /// Products offered by the storefront.
    pub products: Vec<Product>,
}

impl Storefront {
    /// Looks up a product by its reference.
    #[must_use]
    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }
}

/// Read access to storefront records.
pub trait StorefrontDirectory: Send + Sync {
    /// Resolves a slug to its storefront.
    fn get(&self, slug: &str) -> Option<Storefront>;

    /// All storefronts receiving into `wallet`. The webhook path uses this
    /// to attribute an inbound transfer to a merchant.
    fn by_wallet(&self, wallet: &Pubkey) -> Vec<Storefront>;
}

/// In-memory storefront store.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    stores: DashMap<String, Storefront>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a storefront.
    pub fn insert(&self, storefront: Storefront) {
        self.stores.insert(storefront.slug.clone(), storefront);
    }

    /// Number of storefronts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl StorefrontDirectory for MemoryDirectory {
    fn get(&self, slug: &str) -> Option<Storefront> {
        self.stores.get(slug).map(|s| s.value().clone())
    }

    fn by_wallet(&self, wallet: &Pubkey) -> Vec<Storefront> {
        self.stores
            .iter()
            .filter(|entry| &entry.value().wallet == wallet)
            .map(|entry| entry.value().clone())
            .collect()
    }
}
