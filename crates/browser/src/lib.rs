pub mod cdp;
pub mod room;
pub mod session;

pub use cdp::CdpClient;
pub use room::ZepRoom;
pub use session::{find_browser_binary, ChromeSession};
