//! Segment distribution chart using Plotters and console statistics

use std::path::Path;

use plotters::prelude::*;
use tracing::info;

use crate::error::RfmError;
use crate::pipeline::RfmReport;
use crate::segment::Segment;

/// One color per segment, in `Segment::ALL` order
const SEGMENT_COLORS: [RGBColor; 11] = [
    RGBColor(27, 94, 32),
    RGBColor(56, 142, 60),
    RGBColor(124, 179, 66),
    RGBColor(3, 169, 244),
    RGBColor(0, 188, 212),
    RGBColor(255, 193, 7),
    RGBColor(255, 152, 0),
    RGBColor(244, 81, 30),
    RGBColor(211, 47, 47),
    RGBColor(121, 85, 72),
    RGBColor(97, 97, 97),
];

/// Bar heights in `Segment::ALL` order
pub fn segment_sizes(report: &RfmReport) -> Vec<(usize, u32)> {
    let counts = report.segment_counts();
    Segment::ALL
        .iter()
        .enumerate()
        .map(|(idx, segment)| (idx, counts.get(segment).copied().unwrap_or(0) as u32))
        .collect()
}

/// Render a bar chart of customers per segment
///
/// # Arguments
/// * `report` - Scored pipeline output
/// * `output_path` - Path to save the PNG chart
pub fn create_segment_chart(report: &RfmReport, output_path: &Path) -> crate::Result<()> {
    draw_segment_chart(report, output_path).map_err(RfmError::Render)?;
    info!(path = %output_path.display(), "segment chart saved");
    Ok(())
}

fn draw_segment_chart(
    report: &RfmReport,
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sizes = segment_sizes(report);
    let max_size = sizes.iter().map(|&(_, size)| size).max().unwrap_or(1).max(1);

    let root = BitMapBackend::new(output_path, (1100, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per RFM Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0usize..Segment::ALL.len() - 1).into_segmented(),
            0u32..(max_size + max_size / 10 + 1),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(idx) => Segment::ALL
                .get(*idx)
                .map(|s| s.label().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_label_style(("sans-serif", 11))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for &(idx, size) in &sizes {
        let color = SEGMENT_COLORS[idx % SEGMENT_COLORS.len()];
        chart.draw_series(
            Histogram::vertical(&chart)
                .style(color.filled())
                .margin(8)
                .data(std::iter::once((idx, size))),
        )?;
    }

    root.present()?;
    Ok(())
}

/// Print run statistics to console
pub fn print_segment_statistics(report: &RfmReport) {
    let total = report.customers.len();

    println!("\n=== RFM Statistics ===");
    println!("Reference date: {}", report.reference_date);
    println!("Total customers: {}", total);

    println!("\nQuantile cutpoints:");
    println!("  Metric    |      p20 |      p40 |      p60 |      p80 |     p100");
    println!("  ----------|----------|----------|----------|----------|----------");
    for (name, cuts) in [
        ("Recency", report.cutpoints.recency),
        ("Frequency", report.cutpoints.frequency),
        ("Monetary", report.cutpoints.monetary),
    ] {
        let v = cuts.values();
        println!(
            "  {:9} | {:8.2} | {:8.2} | {:8.2} | {:8.2} | {:8.2}",
            name, v[0], v[1], v[2], v[3], v[4]
        );
    }

    println!("\nSegment sizes:");
    for (segment, count) in report.segment_counts() {
        let percentage = if total == 0 {
            0.0
        } else {
            (count as f64 / total as f64) * 100.0
        };
        println!("  {:28} {:6} customers ({:.1}%)", segment.label(), count, percentage);
    }
}
