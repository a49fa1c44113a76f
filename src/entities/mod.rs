pub mod credit_account;
pub mod credit_payment;
pub mod inventory_audit_log;
pub mod inventory_batch;
pub mod mpesa_transaction;
pub mod product;
pub mod sale;
pub mod sale_edit_request;
pub mod sale_line_item;
pub mod sale_payment;
pub mod sale_return;
pub mod sale_return_line_item;
pub mod tenant_settings;
