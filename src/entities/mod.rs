//! sea-orm entities backing the inventory ledger.

pub mod inventory_adjustment;
pub mod inventory_item;
pub mod inventory_reservation;
pub mod inventory_transfer;
pub mod inventory_transfer_item;
pub mod location;

pub use inventory_adjustment::AdjustmentType;
pub use inventory_item::StockRef;
pub use inventory_transfer::TransferStatus;
