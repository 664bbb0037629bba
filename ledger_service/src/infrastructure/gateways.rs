pub mod http_bank_client;
