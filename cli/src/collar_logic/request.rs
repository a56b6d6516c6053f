use anyhow::{Result, bail};
use lib_collar::ats::AtsCredentials;
use lib_collar::ingestors::CsvFile;
use lib_collar::sources::{AtsParams, CsvParams, FetchRequest, VectronicsParams};
use lib_collar::vectronics::{CursorSpec, FetchCursor};

use super::args::{AtsArgs, Command, CsvArgs, VectronicsArgs};

/// Turns the parsed subcommand into a fetch request.
pub fn build_request(command: Command) -> Result<FetchRequest> {
    Ok(match command {
        Command::Vectronics(args) => FetchRequest::Vectronics(vectronics_params(args)?),
        Command::Ats(AtsArgs { usr, pwd, action }) => FetchRequest::Ats(AtsParams {
            credentials: AtsCredentials::new(usr, pwd),
            base_url: None,
            action,
        }),
        Command::Csv(args) => FetchRequest::Csv(csv_params(args)?),
    })
}

fn vectronics_params(args: VectronicsArgs) -> Result<VectronicsParams> {
    let cursors = match (args.after_id.as_slice(), &args.after) {
        (_, Some(ts)) => CursorSpec::Shared(FetchCursor::by_date(ts, args.date_field.into())?),
        ([], None) => CursorSpec::default(),
        ([id], None) => CursorSpec::Shared(FetchCursor::by_id(*id)),
        (ids, None) => CursorSpec::PerDevice(ids.iter().copied().map(FetchCursor::by_id).collect()),
    };
    Ok(VectronicsParams {
        key_paths: args.keys,
        data_type: args.data_type,
        count_only: args.count,
        cursors,
    })
}

fn csv_params(args: CsvArgs) -> Result<CsvParams> {
    if !args.identifier.is_empty() && args.identifier.len() != args.files.len() {
        bail!(
            "got {} identifiers for {} files; give one per file or none",
            args.identifier.len(),
            args.files.len()
        );
    }
    let mut identifiers = args.identifier.into_iter();
    let files = args
        .files
        .into_iter()
        .map(|path| {
            let file = CsvFile::new(path);
            match identifiers.next() {
                Some(id) => file.with_identifier(id),
                None => file,
            }
        })
        .collect();
    Ok(CsvParams {
        files,
        header_column: args.header_column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collar_logic::args::Cli;
    use clap::Parser;

    fn request(argv: &[&str]) -> Result<FetchRequest> {
        build_request(Cli::try_parse_from(argv)?.command)
    }

    #[test]
    fn several_after_ids_become_per_device_cursors() {
        let FetchRequest::Vectronics(params) = request(&[
            "collar-fetch", "vectronics", "--key", "a", "--key", "b", "--after-id", "3", "--after-id", "4",
        ])
        .unwrap() else {
            panic!("expected a vectronics request");
        };
        assert_eq!(
            params.cursors,
            CursorSpec::PerDevice(vec![FetchCursor::by_id(3), FetchCursor::by_id(4)])
        );
    }

    #[test]
    fn date_cursor_uses_server_time_when_asked() {
        let FetchRequest::Vectronics(params) = request(&[
            "collar-fetch", "vectronics", "--key", "a", "--after", "2021-06-01T00:00:00", "--date-field", "scts",
        ])
        .unwrap() else {
            panic!("expected a vectronics request");
        };
        assert_eq!(params.cursors.resolve(1).unwrap()[0].query_pairs()[1].1, "scts");
    }

    #[test]
    fn identifiers_must_match_files() {
        assert!(request(&["collar-fetch", "csv", "a.csv", "b.csv", "--identifier", "x"]).is_err());
        let FetchRequest::Csv(params) =
            request(&["collar-fetch", "csv", "a.csv", "--identifier", "wolf-7"]).unwrap()
        else {
            panic!("expected a csv request");
        };
        assert_eq!(params.files[0].identifier.as_deref(), Some("wolf-7"));
    }
}
