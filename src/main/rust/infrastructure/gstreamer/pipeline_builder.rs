use crate::domain::value_objects::{EndpointConfig, MixerConfig, VideoFormat, VideoMode};

/// Raw audio exchanged between capture and publish pipelines
pub const AUDIO_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: u32 = 1;

const AAC_BITRATE: u32 = 128_000;
const VIDEO_BITRATE_KBPS: u32 = 2_500;

pub struct PipelineBuilder;

impl PipelineBuilder {
    pub const VIDEO_SRC: &'static str = "video_src";
    pub const MIC_SINK: &'static str = "mic_sink";
    pub const VIDEO_SINK: &'static str = "video_sink";

    pub fn audio_src_name(track: u8) -> String {
        format!("audio_src_{}", track)
    }

    fn raw_audio_caps() -> String {
        format!(
            "audio/x-raw,format=S16LE,layout=interleaved,rate={},channels={}",
            AUDIO_RATE, AUDIO_CHANNELS
        )
    }

    fn raw_video_caps(format: VideoFormat) -> String {
        format!(
            "video/x-raw,format=I420,width={},height={},framerate={}/1",
            format.width, format.height, format.fps
        )
    }

    /// Publish pipeline: app sources muxed into FLV and pushed over RTMP.
    ///
    /// Passthrough video arrives as H.264 byte-stream and is only reparsed;
    /// mixed video arrives raw and is encoded here. Every audio track gets its
    /// own source feeding a single mixer and AAC encoder.
    pub fn build_publish_string(
        endpoint: &EndpointConfig,
        stream_key: &str,
        mixer: &MixerConfig,
    ) -> String {
        let video_caps = match mixer.video_mode() {
            VideoMode::Passthrough => "video/x-h264,stream-format=byte-stream,alignment=au".to_string(),
            VideoMode::Mixed => Self::raw_video_caps(mixer.video_format()),
        };
        let video_branch = format!(
            "appsrc name={} is-live=true format=time do-timestamp=true block=false caps=\"{}\" ! \
             queue ! {} ! video/x-h264,stream-format=avc,alignment=au ! mux.",
            Self::VIDEO_SRC,
            video_caps,
            Self::video_encoder(mixer)
        );

        let audio_sources: String = (0..mixer.audio_tracks())
            .map(|track| {
                format!(
                    "appsrc name={} is-live=true format=time do-timestamp=true block=false caps=\"{}\" ! \
                     queue ! audioconvert ! amix. ",
                    Self::audio_src_name(track),
                    Self::raw_audio_caps()
                )
            })
            .collect();

        format!(
            "flvmux name=mux streamable=true ! rtmp2sink location=\"{}\" sync=false \
             {} \
             audiomixer name=amix ! audioconvert ! audioresample ! voaacenc bitrate={} ! aacparse ! queue ! mux. \
             {}",
            endpoint.publish_location(stream_key),
            video_branch,
            AAC_BITRATE,
            audio_sources.trim_end()
        )
    }

    fn video_encoder(mixer: &MixerConfig) -> String {
        match mixer.video_mode() {
            VideoMode::Passthrough => "h264parse config-interval=-1".to_string(),
            VideoMode::Mixed => format!(
                "videoconvert ! x264enc tune=zerolatency speed-preset=veryfast bitrate={} key-int-max={} ! h264parse",
                VIDEO_BITRATE_KBPS,
                mixer.video_format().fps * 2
            ),
        }
    }

    /// Microphone capture delivering raw samples to an app sink
    pub fn build_microphone_string() -> String {
        format!(
            "autoaudiosrc ! queue ! audioconvert ! audioresample ! {} ! \
             appsink name={} sync=false max-buffers=64 drop=true",
            Self::raw_audio_caps(),
            Self::MIC_SINK
        )
    }

    /// Synthetic camera producing frames in the form the mixer expects
    pub fn build_test_source_string(mixer: &MixerConfig) -> String {
        let format = mixer.video_format();
        let output = match mixer.video_mode() {
            VideoMode::Passthrough => format!(
                "x264enc tune=zerolatency speed-preset=ultrafast key-int-max={} ! \
                 video/x-h264,stream-format=byte-stream,alignment=au",
                format.fps
            ),
            VideoMode::Mixed => "queue".to_string(),
        };

        format!(
            "videotestsrc is-live=true pattern=ball ! videoconvert ! {} ! {} ! \
             appsink name={} sync=false max-buffers=8 drop=true",
            Self::raw_video_caps(format),
            output,
            Self::VIDEO_SINK
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        EndpointConfig::new("rtmp://live.example.com/app".to_string()).unwrap()
    }

    #[test]
    fn test_passthrough_publish_pipeline() {
        let pipeline =
            PipelineBuilder::build_publish_string(&endpoint(), "abcd1234", &MixerConfig::default());

        assert!(pipeline.contains("rtmp2sink location=\"rtmp://live.example.com/app/abcd1234\""));
        assert!(pipeline.contains("flvmux name=mux streamable=true"));
        assert!(pipeline.contains("appsrc name=video_src"));
        assert!(pipeline.contains("h264parse config-interval=-1"));
        assert!(!pipeline.contains("x264enc"));
        assert!(pipeline.contains("appsrc name=audio_src_0"));
        assert!(!pipeline.contains("audio_src_1"));
        assert!(pipeline.contains("voaacenc bitrate=128000"));
    }

    #[test]
    fn test_mixed_publish_pipeline_encodes_raw_video() {
        let mixer = MixerConfig::new(VideoMode::Mixed, 3)
            .unwrap()
            .with_video_format(VideoFormat::new(640, 360, 25).unwrap());
        let pipeline = PipelineBuilder::build_publish_string(&endpoint(), "key", &mixer);

        assert!(pipeline.contains("video/x-raw,format=I420,width=640,height=360,framerate=25/1"));
        assert!(pipeline.contains("x264enc tune=zerolatency"));
        assert!(pipeline.contains("key-int-max=50"));
        assert!(pipeline.contains("audio_src_0"));
        assert!(pipeline.contains("audio_src_2"));
        assert_eq!(pipeline.matches("amix.").count(), 3);
    }

    #[test]
    fn test_microphone_pipeline() {
        let pipeline = PipelineBuilder::build_microphone_string();

        assert!(pipeline.starts_with("autoaudiosrc"));
        assert!(pipeline.contains("rate=48000,channels=1"));
        assert!(pipeline.contains("appsink name=mic_sink"));
    }

    #[test]
    fn test_test_source_matches_video_mode() {
        let passthrough = PipelineBuilder::build_test_source_string(&MixerConfig::default());
        assert!(passthrough.contains("x264enc"));
        assert!(passthrough.contains("stream-format=byte-stream"));

        let mixed = MixerConfig::new(VideoMode::Mixed, 1).unwrap();
        let raw = PipelineBuilder::build_test_source_string(&mixed);
        assert!(!raw.contains("x264enc"));
        assert!(raw.contains("appsink name=video_sink"));
    }
}
