use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "perflog", version)]
#[command(about = "Print a tab-separated metrics report for each interval of the day")]
pub struct Cli {
    #[arg(
        short = 'D',
        value_name = "DAYS",
        default_value_t = 0,
        help = "Start the report this many days before today (1 = yesterday)"
    )]
    pub days: u32,
}
