mod command;
mod frame_cipher;
mod frame_codec;

pub use self::command::{
    Brightness, Command, CommandError, Delivery, DisplayMode, ImageIndex, Playlist, Rgb, Route,
    TextColorMode, TextSpeed, UploadLength,
};
pub use self::frame_cipher::{
    Aes128Ecb, AesKey, BlockCipher, CipherError, DEFAULT_BLOCK_SIZE, FrameCipher,
    FrameCipherError, align,
};
pub use self::frame_codec::{FRAME_HEADER, Frame, FrameCodec, FrameCodecError, Opcode};
