pub mod http_notification_emitter;
