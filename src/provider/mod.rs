pub mod cloudflare;

pub use cloudflare::CloudflareClient;
