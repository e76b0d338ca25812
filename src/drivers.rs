pub mod openrgb;
