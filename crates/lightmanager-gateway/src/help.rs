//! Text of the `HELP` command.

use std::io;

use crate::output::{escape_preformatted, OutputSink};
use crate::{PROGRAM_NAME, VERSION};

/// Light Manager section.
const LIGHT_MANAGER_COMMANDS: &str = "\
Light Manager commands\r
    GET CLOCK|TIME    Read the current device date and time\r
    GET HOUSECODE     Read the current FS20 housecode\r
    GET TEMP          Read the current device temperature sensor\r
    SET HOUSECODE addr\r
                      Set the FS20 housecode where\r
                        addr FS20 housecode (11111111-44444444)\r
    SET CLOCK|TIME [time|AUTO]\r
                      Set the device clock to system time or to <time>\r
                      where time format is MMDDhhmm[[CC]YY][.ss]\r
                      Use AUTO to avoid device automatic correction.\r
\r
";

/// Device section.
const DEVICE_COMMANDS: &str = "\
Device commands\r
    FS20 addr cmd     Send a FS20 command where\r
                        addr FS20 address using the format ggss (1111-4444)\r
                        cmd  one of the following commands:\r
                             ON|UP|OPEN      Switch ON or open a jalousie\r
                             OFF|DOWN|CLOSE  Switch OFF or close a jalousie\r
                             TOGGLE          Toggle\r
                             +|BRIGHT        Regulate dimmer one step up\r
                             -|DARK          Regulate dimmer one step down\r
                             <dim>           Absolute (0-16) or percentage\r
                                             (0%-100%) dim value\r
    IT code addr [LEARN|DIP] cmd\r
                      Send an InterTechno command where\r
                        code InterTechno housecode (A-P)\r
                        addr InterTechno channel (1-16)\r
                        LEARN for code learning receivers\r
                        DIP   for receivers with DIP switches\r
                        cmd  one of the following commands:\r
                             ON|UP|OPEN      Switch ON or open a jalousie\r
                             OFF|DOWN|CLOSE  Switch OFF or close a jalousie\r
                             TOGGLE          Toggle\r
                             +|BRIGHT        Regulate dimmer one step up\r
                             -|DARK          Regulate dimmer one step down\r
                             <dim>           Absolute (0-248) or percentage\r
                                             (0%-100%) dim value\r
    UNI addr cmd      Send an Uniroll command where\r
                        addr Uniroll jalousie number (1-16)\r
                        cmd  UP|+|DOWN|-|STOP\r
    SCENE scn         Activate scene <scn> (1-254)\r
\r
";

/// System section.
const SYSTEM_COMMANDS: &str = "\
System commands\r
    ? or HELP         Print this help\r
    VERSION           Print program name and version\r
    VERBOSE           Be verbose (command and result output)\r
    QUIET             Be quiet (no command and result output)\r
    EXIT              Disconnect and exit server program\r
    QUIT              Disconnect\r
    WAIT ms           Wait for <ms> milliseconds\r
";

/// The three command sections, without the title.
pub fn help_body() -> String {
    [LIGHT_MANAGER_COMMANDS, DEVICE_COMMANDS, SYSTEM_COMMANDS].concat()
}

/// Title line of the help, surrounded by blank lines.
pub fn help_title() -> String {
    format!("\r\n{} v{} help\r\n\r\n", PROGRAM_NAME, VERSION)
}

/// Write the full help.
///
/// On an HTML sink the body goes out preformatted, so its column layout
/// survives.
pub fn write_help(sink: &mut dyn OutputSink) -> io::Result<()> {
    sink.write_text(&help_title())?;
    if sink.is_html() {
        sink.write_verbatim("<pre>")?;
        sink.write_verbatim(&escape_preformatted(&help_body()))?;
        sink.write_verbatim("</pre>")
    } else {
        sink.write_verbatim(&help_body())
    }
}
