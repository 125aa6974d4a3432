pub mod cart_file;
pub mod checkout;
pub mod quote;
