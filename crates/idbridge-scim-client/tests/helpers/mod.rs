pub mod mock_remote;
