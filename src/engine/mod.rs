pub mod futures;
pub mod spot;
pub mod wallet;
