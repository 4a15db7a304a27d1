use serde::{
    de::{self, MapAccess, SeqAccess, Visitor},
    ser::SerializeStruct,
    Deserialize, Serialize,
};
use std::{fmt, ops::Range};

// In the python script, these values get assigned to scn.render.border_*
// Fractions of the full frame, origin at the bottom left corner like blender does.
#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    pub x: Range<f32>,
    pub y: Range<f32>,
}

impl Border {
    pub fn new(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        Self {
            x: Range {
                start: min_x,
                end: max_x,
            },
            y: Range {
                start: min_y,
                end: max_y,
            },
        }
    }

    /// The whole frame, `[0,1]` on both axis.
    pub fn full() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }

    pub fn min_x(&self) -> f32 {
        self.x.start
    }

    pub fn max_x(&self) -> f32 {
        self.x.end
    }

    pub fn min_y(&self) -> f32 {
        self.y.start
    }

    pub fn max_y(&self) -> f32 {
        self.y.end
    }

    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    /// Area covered by this border as a fraction of the full frame.
    pub fn area(&self) -> f32 {
        (self.x.end - self.x.start) * (self.y.end - self.y.start)
    }
}

impl Default for Border {
    fn default() -> Self {
        Self::full()
    }
}

impl Serialize for Border {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Border", 4)?;
        state.serialize_field("X", &self.x.start)?;
        state.serialize_field("X2", &self.x.end)?;
        state.serialize_field("Y", &self.y.start)?;
        state.serialize_field("Y2", &self.y.end)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Border {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BorderVisitor;

        impl<'de> Visitor<'de> for BorderVisitor {
            type Value = Border;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("struct Border")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let x = seq.next_element()?.unwrap_or(0.0);
                let x2 = seq.next_element()?.unwrap_or(1.0);
                let y = seq.next_element()?.unwrap_or(0.0);
                let y2 = seq.next_element()?.unwrap_or(1.0);
                Ok(Border::new(x, x2, y, y2))
            }

            fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut border = Border::full();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "X" => border.x.start = map.next_value()?,
                        "X2" => border.x.end = map.next_value()?,
                        "Y" => border.y.start = map.next_value()?,
                        "Y2" => border.y.end = map.next_value()?,
                        other => return Err(de::Error::unknown_field(other, FIELDS)),
                    }
                }
                Ok(border)
            }
        }

        const FIELDS: &[&str] = &["X", "X2", "Y", "Y2"];
        deserializer.deserialize_struct("Border", FIELDS, BorderVisitor)
    }
}
