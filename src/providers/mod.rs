pub mod eastmoney;
pub mod sina;
pub mod util;

pub use eastmoney::EastmoneyFundProvider;
pub use sina::SinaQuoteProvider;
