use api_server::exports::demo;

#[tokio::main]
async fn main() {
    if let Err(e) = demo::start_demo().await {
        eprintln!("Error starting caption demo: {:?}", e);
        std::process::exit(1);
    }
}
