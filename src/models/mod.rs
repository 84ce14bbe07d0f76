pub mod courier;
pub mod merchant;
pub mod order;
pub mod order_line;
pub mod product;
