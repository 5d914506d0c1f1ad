#[tokio::main]
async fn main() {
    if let Err(e) = booking_engine::run().await {
        eprintln!("booking-engine stopped: {}", e);
        std::process::exit(1);
    }
}
