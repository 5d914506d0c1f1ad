pub mod http_payment_processor;
