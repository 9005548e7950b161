//! Data package (catalog item)

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Money, PackageRef};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPackage {
    id: PackageRef,
    name: String,
    quantity_gb: u32,
    price: Money,
    enabled: bool,
}

impl DataPackage {
    pub fn new(id: PackageRef, name: impl Into<String>, quantity_gb: u32, price: Money, enabled: bool) -> Self {
        Self { id, name: name.into(), quantity_gb, price, enabled }
    }

    pub fn id(&self) -> &PackageRef { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn quantity_gb(&self) -> u32 { self.quantity_gb }
    pub fn price(&self) -> &Money { &self.price }
    pub fn is_enabled(&self) -> bool { self.enabled }
}

/// Storefront ordering: enabled packages only, smallest bundle first.
pub fn storefront_listing(mut packages: Vec<DataPackage>) -> Vec<DataPackage> {
    packages.retain(DataPackage::is_enabled);
    packages.sort_by_key(DataPackage::quantity_gb);
    packages
}
