//! HEIF/AVIF container boxes
//!
//! Single images are written with `avif-serialize`; grids need a derived
//! `grid` item, which that crate does not model, so [`writer`] produces
//! them. Reading goes through `zenavif-parse`, which hands back a grid
//! item's payload for [`GridDescriptor::from_bytes`].

pub(crate) mod writer;

/// `auxC` type URN marking an auxiliary image as alpha
pub(crate) const ALPHA_URN: &str = "urn:mpeg:mpegB:cicp:systems:auxiliary:alpha";

/// Grid layout stored in a `grid` item's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GridDescriptor {
    pub columns: u32,
    pub rows: u32,
    pub output_width: u32,
    pub output_height: u32,
}

impl GridDescriptor {
    /// Serialized payload
    pub(crate) fn to_bytes(self) -> Vec<u8> {
        let large = self.output_width > u32::from(u16::MAX) || self.output_height > u32::from(u16::MAX);
        let mut out = vec![
            0, // version
            u8::from(large),
            (self.rows - 1) as u8,
            (self.columns - 1) as u8,
        ];
        if large {
            out.extend_from_slice(&self.output_width.to_be_bytes());
            out.extend_from_slice(&self.output_height.to_be_bytes());
        } else {
            out.extend_from_slice(&(self.output_width as u16).to_be_bytes());
            out.extend_from_slice(&(self.output_height as u16).to_be_bytes());
        }
        out
    }

    /// Parse a `grid` item payload; `None` if it is malformed or not version 0
    pub(crate) fn from_bytes(data: &[u8]) -> Option<Self> {
        let (&[version, flags, rows, columns], rest) = data.split_first_chunk::<4>()?;
        if version != 0 {
            return None;
        }
        let (output_width, output_height) = if flags & 1 == 0 {
            let (w, rest) = rest.split_first_chunk::<2>()?;
            let (h, _) = rest.split_first_chunk::<2>()?;
            (u32::from(u16::from_be_bytes(*w)), u32::from(u16::from_be_bytes(*h)))
        } else {
            let (w, rest) = rest.split_first_chunk::<4>()?;
            let (h, _) = rest.split_first_chunk::<4>()?;
            (u32::from_be_bytes(*w), u32::from_be_bytes(*h))
        };
        Some(Self {
            columns: u32::from(columns) + 1,
            rows: u32::from(rows) + 1,
            output_width,
            output_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_fields() {
        let grid = GridDescriptor {
            columns: 3,
            rows: 256,
            output_width: 70000,
            output_height: 9,
        };
        assert_eq!(GridDescriptor::from_bytes(&grid.to_bytes()), Some(grid));
        assert_eq!(
            GridDescriptor::from_bytes(&[0, 0, 1, 0, 0, 100, 0, 40]),
            Some(GridDescriptor {
                columns: 1,
                rows: 2,
                output_width: 100,
                output_height: 40,
            })
        );
        assert_eq!(GridDescriptor::from_bytes(&[1, 0, 1, 0, 0, 100, 0, 40]), None);
        assert_eq!(GridDescriptor::from_bytes(&[0, 1, 1, 0, 0, 100, 0, 40]), None);
        assert_eq!(GridDescriptor::from_bytes(&[0, 0, 1]), None);
    }
}
