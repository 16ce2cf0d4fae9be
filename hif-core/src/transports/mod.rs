// 传输层实现。真实的 SPI/SDIO 总线驱动不在本 crate 内。

#[cfg(any(test, feature = "transport_mock"))]
pub mod mock;
