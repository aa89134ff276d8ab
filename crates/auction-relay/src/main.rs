#[tokio::main]
async fn main() {
    auction_relay::start(std::env::args()).await;
}
