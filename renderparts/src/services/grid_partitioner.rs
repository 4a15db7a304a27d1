use crate::models::{
    job_config::JobConfiguration,
    tile::{strip_extension, TileDescriptor},
};
use std::collections::HashSet;

/// Every tile of the job in dispatch order: row outer, column inner, both ascending.
pub fn all_tiles(config: &JobConfiguration) -> Vec<TileDescriptor> {
    let n = config.parts_count;
    (0..n)
        .flat_map(|row| (0..n).map(move |column| (row, column)))
        .map(|(row, column)| TileDescriptor::new(&config.filename_prefix, row, column, n))
        .collect()
}

/// Tiles still to render, in dispatch order.
/// `already_rendered` holds file names as found on disk, extensions are ignored.
pub fn partition<I, S>(config: &JobConfiguration, already_rendered: I) -> Vec<TileDescriptor>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let rendered = already_rendered
        .into_iter()
        .map(|name| strip_extension(name.as_ref()).to_owned())
        .collect::<HashSet<String>>();

    all_tiles(config)
        .into_iter()
        .filter(|tile| !rendered.contains(&tile.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(parts_count: u32) -> JobConfiguration {
        JobConfiguration {
            parts_count,
            ..Default::default()
        }
    }

    #[test]
    fn produces_n_squared_unique_names() {
        for n in 1..=12 {
            let tiles = all_tiles(&config(n));
            assert_eq!(tiles.len() as u32, n * n);
            let names = tiles.iter().map(|t| &t.name).collect::<HashSet<_>>();
            assert_eq!(names.len(), tiles.len(), "duplicate names for n = {n}");
        }
    }

    #[test]
    fn borders_cover_the_unit_square_without_gaps() {
        for n in 1..=9 {
            let tiles = all_tiles(&config(n));
            let area: f32 = tiles.iter().map(|t| t.border.area()).sum();
            assert!((area - 1.0).abs() < 1e-4, "area {area} for n = {n}");

            for tile in &tiles {
                let border = &tile.border;
                assert!(border.min_x() >= 0.0 && border.max_x() <= 1.0);
                assert!(border.min_y() >= 0.0 && border.max_y() <= 1.0);
                assert!(border.min_x() < border.max_x());
                assert!(border.min_y() < border.max_y());

                // neighbours share their edge exactly
                if let Some(right) = tiles
                    .iter()
                    .find(|t| t.row == tile.row + 1 && t.column == tile.column)
                {
                    assert_eq!(border.max_x(), right.border.min_x());
                }
                if let Some(up) = tiles
                    .iter()
                    .find(|t| t.row == tile.row && t.column == tile.column + 1)
                {
                    assert_eq!(border.max_y(), up.border.min_y());
                }
            }

            // outer edges land on the frame
            assert!(tiles.iter().any(|t| t.border.max_x() == 1.0));
            assert!(tiles.iter().any(|t| t.border.max_y() == 1.0));
        }
    }

    #[test]
    fn enumerates_row_major() {
        let tiles = all_tiles(&config(3));
        let coords = tiles
            .iter()
            .map(|t| (t.row, t.column))
            .collect::<Vec<_>>();
        assert_eq!(
            coords,
            vec![
                (0, 0),
                (0, 1),
                (0, 2),
                (1, 0),
                (1, 1),
                (1, 2),
                (2, 0),
                (2, 1),
                (2, 2)
            ]
        );
    }

    #[test]
    fn four_by_four_fart_job() {
        let tiles = all_tiles(&config(4));
        assert_eq!(tiles.len(), 16);
        assert_eq!(tiles.first().unwrap().name, "Fart_1_1");
        assert_eq!(tiles[1].name, "Fart_1_2");
        assert_eq!(tiles.last().unwrap().name, "Fart_4_4");
    }

    #[test]
    fn ten_by_ten_pads_to_two_digits() {
        let tiles = all_tiles(&config(10));
        assert_eq!(tiles.first().unwrap().name, "Fart_01_01");
        assert_eq!(tiles.last().unwrap().name, "Fart_10_10");
    }

    #[test]
    fn is_idempotent() {
        let config = config(5);
        let rendered = ["Fart_1_1.png", "Fart_3_4.png"];
        assert_eq!(partition(&config, rendered), partition(&config, rendered));
    }

    #[test]
    fn excludes_exactly_the_rendered_tiles_in_order() {
        let config = config(3);
        let all = all_tiles(&config);
        let remaining = partition(&config, ["Fart_1_2.png", "Fart_3_3.jpg", "Fart_2_1"]);

        let expected = all
            .into_iter()
            .filter(|t| !["Fart_1_2", "Fart_3_3", "Fart_2_1"].contains(&t.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(remaining, expected);
        assert_eq!(remaining.len(), 6);
    }

    #[test]
    fn unrelated_names_change_nothing() {
        let config = config(2);
        let remaining = partition(&config, ["FINAL_Fart.png", "Other_1_1.png", "Fart_1_1_old.png"]);
        assert_eq!(remaining, all_tiles(&config));
    }
}
