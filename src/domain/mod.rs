// 領域層：設備模型與對外連接埠

pub mod model;
pub mod ports;
