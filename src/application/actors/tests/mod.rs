// Price stream tests against a local WebSocket server

pub mod mock_finnhub_server;

pub use mock_finnhub_server::MockFinnhubServer;
