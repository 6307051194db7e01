#[tokio::main]
async fn main() {
    rail_wars_be::start_server().await;
}
