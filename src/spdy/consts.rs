/// SPDY protocol version spoken by this client.
pub const SPDY_VERSION: u16 = 2;

/// Control frame types (SPDY/2 section 2.6)
pub const SYN_STREAM: u16 = 1;
pub const SYN_REPLY: u16 = 2;
pub const RST_STREAM: u16 = 3;
pub const SETTINGS: u16 = 4;
pub const NOOP: u16 = 5;
pub const PING: u16 = 6;
pub const GOAWAY: u16 = 7;
pub const HEADERS: u16 = 8;

/// Frame flags
pub const FLAG_FIN: u8 = 0x01;

/// Both control and data frames start with two 32-bit words.
pub const FRAME_HEADER_SIZE: usize = 8;
pub const CONTROL_BIT: u32 = 0x8000_0000;
pub const STREAM_ID_MASK: u32 = 0x7fff_ffff;
pub const LENGTH_MASK: u32 = 0x00ff_ffff;
pub const MAX_FRAME_LENGTH: usize = 0x00ff_ffff;

/// First word of every SYN_STREAM this client emits: control bit, version 2, type 1.
pub const SYN_STREAM_HEAD: u32 = 0x8002_0001;

/// Stream id + associated id + priority word precede the SYN_STREAM header block.
pub const SYN_STREAM_FIXED_LEN: usize = 10;
/// Stream id + unused 16 bits precede the SYN_REPLY and HEADERS header blocks.
pub const SYN_REPLY_FIXED_LEN: usize = 6;

/// Upper bound on an inflated header block.
pub const MAX_HEADER_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Synthetic header names carried in SYN_STREAM / SYN_REPLY header blocks.
pub const HEADER_METHOD: &str = "method";
pub const HEADER_SCHEME: &str = "scheme";
pub const HEADER_HOST: &str = "host";
pub const HEADER_URL: &str = "url";
pub const HEADER_VERSION: &str = "version";
pub const HEADER_STATUS: &str = "status";

/// Separator between the values of a multi-valued header.
pub const VALUE_SEPARATOR: char = '\0';

/// Zlib dictionary shared by every SPDY/2 header compressor and decompressor.
/// The trailing NUL is not in the draft text but is what deployed peers use.
pub const HEADER_DICTIONARY: &[u8] = concat!(
    "optionsgetheadpostputdeletetraceacceptaccept-charsetaccept-encodingaccept-",
    "languageauthorizationexpectfromhostif-modified-sinceif-matchif-none-matchi",
    "f-rangeif-unmodifiedsincemax-forwardsproxy-authorizationrangerefererteuser",
    "-agent10010120020120220320420520630030130230330430530630740040140240340440",
    "5406407408409410411412413414415416417500501502503504505accept-rangesageeta",
    "glocationproxy-authenticatepublicretry-afterservervarywarningwww-authentic",
    "ateallowcontent-basecontent-encodingcache-controlconnectiondatetrailertran",
    "sfer-encodingupgradeviawarningcontent-languagecontent-lengthcontent-locati",
    "oncontent-md5content-rangecontent-typeetagexpireslast-modifiedset-cookieMo",
    "ndayTuesdayWednesdayThursdayFridaySaturdaySundayJanFebMarAprMayJunJulAugSe",
    "pOctNovDecchunkedtext/htmlimage/pngimage/jpgimage/gifapplication/xmlapplic",
    "ation/xhtmltext/plainpublicmax-agecharset=iso-8859-1utf-8gzipdeflateHTTP/1",
    ".1statusversionurl\0"
)
.as_bytes();

pub fn control_frame_name(frame_type: u16) -> &'static str {
    match frame_type {
        SYN_STREAM => "SYN_STREAM",
        SYN_REPLY => "SYN_REPLY",
        RST_STREAM => "RST_STREAM",
        SETTINGS => "SETTINGS",
        NOOP => "NOOP",
        PING => "PING",
        GOAWAY => "GOAWAY",
        HEADERS => "HEADERS",
        _ => "UNKNOWN",
    }
}
