use owo_colors::{OwoColorize, Style};

/// Styles terminal output, or passes text through when colour is off.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn success(self, text: impl AsRef<str>) -> String {
        self.paint(text.as_ref(), Style::new().bold().green())
    }

    pub(crate) fn value(self, text: impl AsRef<str>) -> String {
        self.paint(text.as_ref(), Style::new().bold())
    }

    pub(crate) fn muted(self, text: impl AsRef<str>) -> String {
        self.paint(text.as_ref(), Style::new().dimmed())
    }

    /// Renders a swatch-style `#RRGGBB` label in the colour itself.
    pub(crate) fn colour(self, red: u8, green: u8, blue: u8) -> String {
        let label = format!("#{red:02X}{green:02X}{blue:02X}");
        if self.use_colour {
            format!("{}", label.truecolor(red, green, blue).bold())
        } else {
            label
        }
    }

    fn paint(self, text: &str, style: Style) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn apply(painter: Painter, style: &str, text: &str) -> String {
        match style {
            "success" => painter.success(text),
            "value" => painter.value(text),
            "muted" => painter.muted(text),
            other => panic!("unknown style: {other}"),
        }
    }

    #[rstest]
    #[case::success("success")]
    #[case::value("value")]
    #[case::muted("muted")]
    fn plain_painter_leaves_text_alone(#[case] style: &str) {
        assert_eq!("glasses", apply(Painter::new(false), style, "glasses"));
    }

    #[rstest]
    #[case::success("success")]
    #[case::value("value")]
    #[case::muted("muted")]
    fn colour_painter_wraps_text(#[case] style: &str) {
        let styled = apply(Painter::new(true), style, "glasses");
        assert_ne!("glasses", styled);
        assert!(styled.contains("glasses"));
    }

    #[test]
    fn colour_label_is_uppercase_hex() {
        assert_eq!("#FF0080", Painter::new(false).colour(0xFF, 0x00, 0x80));
    }
}
