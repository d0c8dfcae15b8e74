pub mod hearts;
