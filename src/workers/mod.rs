pub mod compressor;
